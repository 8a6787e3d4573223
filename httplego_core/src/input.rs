pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn as_bytes(&self) -> &[u8];
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

/// Serialized message produced from a template, with an MD5 fingerprint that lets
/// an engine deduplicate generated inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    digest: [u8; 16],
}

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let digest = md5::compute(&bytes).0;
        Self { bytes, digest }
    }

    pub fn digest(&self) -> [u8; 16] {
        self.digest
    }

    pub fn digest_hex(&self) -> String {
        format!("{:x}", md5::Digest(self.digest))
    }
}

impl Input for Payload {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    fn len(&self) -> usize {
        self.bytes.len()
    }
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Payload> for Vec<u8> {
    fn from(payload: Payload) -> Self {
        payload.bytes
    }
}
