pub mod crypto;
pub mod envelope;
pub mod section;
pub mod meta;
pub mod schema;
pub mod error;
pub mod convert;

pub use crypto::{Encryptor, EncryptorRegistry};
pub use envelope::{EnvelopeBlock, seal};
pub use section::{SectionArchive, SectionSource, SectionWriter};
pub use meta::Meta;
pub use error::{ConvertError, ErrorKind, Stage};
pub use convert::{convert, convert_file, convert_with, ConvertOptions};
