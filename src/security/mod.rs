pub mod credentials;
pub mod source;
pub mod transform;

pub use credentials::CredentialStore;
#[cfg(feature = "interactive")]
pub use source::PromptCredentialSource;
pub use source::{CredentialSource, PromptKind, ScriptedCredentialSource};
pub use transform::{KEY_LEN, KeyedTransform, NONCE_LEN};
