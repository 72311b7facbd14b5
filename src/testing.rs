//! In-process fakes for driving the pipeline without network or wall-clock waits.
//!
//! Used by the unit tests and by `tests/`; also handy for replaying a captured
//! upstream sequence against the scanner.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::steam::fetcher::Sleeper;
use crate::steam::http::{HttpResponse, Transport, TransportError};

type Reply = Result<HttpResponse, String>;

struct Route {
    url: String,
    query: Vec<(String, String)>,
    replies: VecDeque<Reply>,
    last: Option<Reply>,
}

impl Route {
    fn matches(&self, url: &str, query: &[(String, String)]) -> bool {
        self.url == url && self.query.iter().all(|pair| query.contains(pair))
    }

    fn next_reply(&mut self) -> Option<Reply> {
        match self.replies.pop_front() {
            Some(reply) => {
                self.last = Some(reply.clone());
                Some(reply)
            }
            None => self.last.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport answering from a script of canned replies.
///
/// A route is a URL plus the query pairs that must be present. Replies queue
/// per route; once drained the last reply repeats. Requests matching no route
/// get a 404 with an empty body.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, query: &[(&str, &str)], status: u16, body: &str) -> &Self {
        self.push(url, query, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail(&self, url: &str, query: &[(&str, &str)], message: &str) -> &Self {
        self.push(url, query, Err(message.to_string()))
    }

    fn push(&self, url: &str, query: &[(&str, &str)], reply: Reply) -> &Self {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Ok(mut routes) = self.routes.lock() {
            match routes
                .iter_mut()
                .find(|r| r.url == url && r.query == query)
            {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    url: url.to_string(),
                    query,
                    replies: VecDeque::from([reply]),
                    last: None,
                }),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.url == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                url: url.to_string(),
                query: query.to_vec(),
            });
        }
        let reply = self.routes.lock().ok().and_then(|mut routes| {
            routes
                .iter_mut()
                .filter(|r| r.matches(url, query))
                .max_by_key(|r| r.query.len())
                .and_then(Route::next_reply)
        });
        match reply {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(message)) => Err(TransportError::new(message)),
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}

/// Sleeper that returns immediately and remembers what it was asked to wait.
#[derive(Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}
