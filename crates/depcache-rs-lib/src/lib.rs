pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;
pub use config::{init, init_with, config};

pub mod cache;
pub use cache::{Cache, Package, Version, PackageId, VersionId};

pub mod policy;
pub use policy::Policy;

pub mod depcache;
pub use depcache::DepCache;

pub mod resolver;
pub use resolver::ProblemResolver;

pub mod progress;
pub mod acquire;

pub mod size_format;
pub use size_format::size_to_string;
