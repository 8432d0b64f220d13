//! Clients for systems outside the repository: the audio file-transfer
//! drop and the bibliographic lookup service.

pub mod biblio;
pub mod transfer;

pub use biblio::{ArticleRecord, BibliographicClient, LookupError};
pub use transfer::{FileTransfer, LocalTransfer};
