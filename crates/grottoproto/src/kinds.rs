use std::collections::HashMap;

use crate::request::RequestKind;

/// Which envelope kinds a connection may submit, and what they decode to.
///
/// Anything not in the table is refused before its body is even decoded, so
/// a remote client cannot reach internal requests such as `stop`.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, RequestKind>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything a player client is allowed to send.
    pub fn client() -> Self {
        RequestKind::ALL
            .into_iter()
            .filter(|k| *k != RequestKind::Stop)
            .fold(Self::new(), Self::with)
    }

    pub fn with(mut self, kind: RequestKind) -> Self {
        self.register(kind);
        self
    }

    pub fn register(&mut self, kind: RequestKind) {
        self.kinds.insert(kind.as_str().to_string(), kind);
    }

    pub fn lookup(&self, name: &str) -> Option<RequestKind> {
        self.kinds.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut v = self.kinds.keys().map(String::as_str).collect::<Vec<_>>();
        v.sort_unstable();
        v
    }
}
