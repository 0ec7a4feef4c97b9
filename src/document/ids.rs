use ahash::AHashSet;
use uuid::Uuid;

/// Name-based UUID namespace for node ids minted by this crate.
const NODE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b756d69_6b69_5000_8000_6e6f64650001);

/// Mints node ids that are stable across parses and never collide.
///
/// An id is a v5 UUID of the node's structural path, prefixed with its type
/// tag (`Density-<uuid>`). If that id is already taken the name is re-hashed
/// with an attempt counter.
#[derive(Debug, Default, Clone)]
pub struct NodeIdAllocator {
    taken: AHashSet<String>,
}

impl NodeIdAllocator {
    pub fn new(taken: AHashSet<String>) -> Self {
        Self { taken }
    }

    pub fn is_taken(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    pub fn reserve(&mut self, id: &str) {
        self.taken.insert(id.to_string());
    }

    pub fn mint(&mut self, prefix: &str, path: &str) -> String {
        let mut attempt: u32 = 0;
        loop {
            let name = format!("{prefix}/{path}/{attempt}");
            let uuid = Uuid::new_v5(&NODE_ID_NAMESPACE, name.as_bytes());
            let id = format!("{prefix}-{uuid}");
            if self.taken.insert(id.clone()) {
                return id;
            }
            attempt += 1;
        }
    }
}

/// Hands out unique edge ids, suffixing repeats with `#2`, `#3`...
#[derive(Debug, Default, Clone)]
pub struct EdgeIdAllocator {
    taken: AHashSet<String>,
}

impl EdgeIdAllocator {
    pub fn unique(&mut self, base: String) -> String {
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}#{suffix}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}
