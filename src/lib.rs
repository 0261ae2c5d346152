pub mod apdu;
pub mod blob;
pub mod crypto;
pub mod driver;
pub mod error;
pub mod iso;
pub mod loader;
pub mod pubkey;
pub mod registry;
pub mod resolver;
pub mod secenv;

pub use driver::{
    Algorithm, AlgorithmInfo, CardCtl, FileView, OpenPgpCard, OpenPgpCardBuilder, PinType,
    SelectOutcome, SelectPath,
};
pub use error::{Error, Result};
