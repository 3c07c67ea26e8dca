use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_LOG_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Info,
    Http,
    Warn,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub text: String,
    pub kind: Kind,
}

static STATUS_LOG: Lazy<Mutex<VecDeque<Entry>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)));

pub fn log<T: Into<String>>(line: T) {
    log_with(Kind::Info, line);
}

pub fn log_with<T: Into<String>>(kind: Kind, line: T) {
    if let Ok(mut buf) = STATUS_LOG.lock() {
        let s = line.into();
        if kind == Kind::Warn {
            eprintln!("{}", s);
        }
        if buf.len() >= MAX_LOG_LINES {
            buf.pop_front();
        }
        buf.push_back(Entry { text: s, kind });
    }
}

pub fn recent(n: usize) -> Vec<Entry> {
    if let Ok(buf) = STATUS_LOG.lock() {
        let len = buf.len();
        let take = n.min(len);
        buf.iter().skip(len - take).cloned().collect()
    } else {
        Vec::new()
    }
}

#[allow(dead_code)]
pub fn clear() {
    if let Ok(mut buf) = STATUS_LOG.lock() {
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The log is process-wide, so assert containment and relative order
    // rather than exact contents: other tests may log concurrently.
    #[test]
    fn recent_keeps_insertion_order() {
        log("status ring first");
        log_with(Kind::Http, "status ring second");

        let entries = recent(MAX_LOG_LINES);
        let first = entries.iter().position(|e| e.text == "status ring first");
        let second = entries.iter().position(|e| e.text == "status ring second");
        assert!(first.is_some() && second.is_some());
        assert!(first < second);
        assert_eq!(entries[second.unwrap()].kind, Kind::Http);
    }
}
