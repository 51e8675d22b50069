pub mod bootstrap;
pub mod cacerts;
pub mod init;
pub mod token;
pub mod version;

pub use bootstrap::Bootstrap;
pub use cacerts::Cacerts;
pub use init::Init;
pub use token::Token;
pub use version::Version;
