use std::fmt;

use sha2::{Digest, Sha256};

/// Namespace prefix for attachment digests. Keeps the attachment and text
/// fingerprint spaces disjoint.
const ATTACHMENT_NAMESPACE: &str = "attachment:";

/// Broad class of repeatable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentClass {
    Text,
    Attachment,
}

impl ContentClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentClass::Text => "text",
            ContentClass::Attachment => "attachment",
        }
    }
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-addressed identifier for a message.
///
/// A SHA-256 digest (stored as 64 lowercase hex chars) tagged with the
/// content class. Two fingerprints are equal iff both digest and class match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    digest: String,
    class: ContentClass,
}

impl ContentFingerprint {
    /// Hex-encoded digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn class(&self) -> ContentClass {
        self.class
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}:{short}", self.class)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint text content. Leading and trailing whitespace is ignored.
pub fn fingerprint_text(text: &str) -> ContentFingerprint {
    ContentFingerprint {
        digest: sha256_hex(text.trim().as_bytes()),
        class: ContentClass::Text,
    }
}

/// Fingerprint an attachment by its platform-stable unique id.
pub fn fingerprint_attachment(stable_unique_id: &str) -> ContentFingerprint {
    let namespaced = format!("{ATTACHMENT_NAMESPACE}{stable_unique_id}");
    ContentFingerprint {
        digest: sha256_hex(namespaced.as_bytes()),
        class: ContentClass::Attachment,
    }
}
