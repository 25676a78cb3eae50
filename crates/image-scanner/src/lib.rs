#![doc = include_str!("../README.md")]

mod aggregate;
pub mod assets;
pub mod error;
mod history;
pub mod registry;
pub mod remote;
pub mod scanner;
pub mod secrets;
pub mod source;
pub mod tarball;
mod walker;
mod worker;

// --- 주요 타입 re-export ---

pub use error::ImageScanError;
pub use registry::{AnonymousAuth, RegistryAuthHook, TagClient};
pub use remote::{RemoteImageSource, RemoteProvider};
pub use scanner::{ImageScanner, ScanOptions};
pub use secrets::SecretScanner;
pub use source::{ImageConfigFile, ImageProvider, ImageSource, LayerDescriptor};
pub use tarball::{TarballImageSource, TarballProvider};
