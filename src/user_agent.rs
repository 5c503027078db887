use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Round-robin pool of user agents shared by all requests.
#[derive(Debug, Clone)]
pub struct UserAgents {
    pool: Arc<[String]>,
    cursor: Arc<AtomicUsize>,
}

impl UserAgents {
    /// Falls back to the built-in pool when `agents` is empty.
    pub fn new(agents: Vec<String>) -> Self {
        let pool: Vec<String> = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            agents
        };

        Self {
            pool: pool.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rotate(&self) -> &str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        &self.pool[idx]
    }
}

impl Default for UserAgents {
    fn default() -> Self {
        Self::new(vec![])
    }
}
