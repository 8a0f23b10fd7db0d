//! In-memory stand-ins for the content service.

use crate::engine::RunContext;
use crate::policy::FetchPolicy;
use crate::transport::{Transport, TransportError, TransportResponse};
use scripture_model::VersionConfig;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Scripted {
    Ok(String),
    Status(u16),
    Timeout,
}

/// Replays scripted responses keyed by the last URL path segment without its
/// `.json` suffix (`GEN.1.KJV`, or the version id for metadata). The final
/// scripted response for a key repeats; unknown keys answer 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn route(self, key: &str, responses: Vec<Scripted>) -> Self {
        self.set(key, responses);
        self
    }

    pub fn set(&self, key: &str, responses: Vec<Scripted>) {
        self.routes
            .lock()
            .unwrap()
            .insert(key.to_string(), responses.into());
    }

    pub fn requests(&self, key: &str) -> usize {
        self.hits.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    fn next(&self, key: &str) -> Scripted {
        *self.hits.lock().unwrap().entry(key.to_string()).or_default() += 1;
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Scripted::Status(404)),
            None => Scripted::Status(404),
        }
    }
}

fn key_for(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    last.strip_suffix(".json").unwrap_or(last).to_string()
}

impl Transport for ScriptedTransport {
    fn get(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let scripted = self.next(&key_for(url));
        async move {
            match scripted {
                Scripted::Ok(body) => Ok(TransportResponse {
                    status: 200,
                    retry_after: None,
                    body,
                }),
                Scripted::Status(status) => Ok(TransportResponse {
                    status,
                    retry_after: None,
                    body: String::new(),
                }),
                Scripted::Timeout => Err(TransportError::Timeout),
            }
        }
    }
}

/// A chapter response in the service's Next.js data shape.
pub fn chapter_body(book: &str, chapter: u16, verses: &[(u16, &str)]) -> String {
    let mut html = format!(r#"<div class="chapter ch{chapter}" data-usfm="{book}.{chapter}">"#);
    html.push_str(&format!(r#"<div class="label">{chapter}</div><div class="p">"#));
    for (verse, text) in verses {
        html.push_str(&format!(
            r#"<span class="verse v{verse}" data-usfm="{book}.{chapter}.{verse}">"#
        ));
        html.push_str(&format!(
            r#"<span class="label">{verse}</span><span class="content">{text}</span></span>"#
        ));
    }
    html.push_str("</div></div>");
    serde_json::json!({
        "pageProps": {
            "chapterInfo": {
                "reference": {"usfm": [format!("{book}.{chapter}")]},
                "content": html
            }
        }
    })
    .to_string()
}

pub fn context(policy: FetchPolicy) -> RunContext {
    RunContext::new(VersionConfig::new("1", "KJV", "build123", "en-GB"), &policy)
}
