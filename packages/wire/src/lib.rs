//! # hopline-wire
//!
//! The thread-free data model of the hopline client: requests and the frames
//! they turn into, what a transport reports for a hop, the typed responses
//! callers see, and the two pieces of encoding the engine must get exactly
//! right:
//!
//! - [`cgi::merge`] folds redirect-supplied query parameters into a request.
//! - [`xattr`] frames batched extended-attribute requests.
//!
//! ```
//! use hopline_wire::cgi::{merge, CgiMap};
//!
//! let current = CgiMap::parse("tried=s1");
//! let merged = merge(&current, &CgiMap::parse("tried=s2"), false);
//! assert_eq!(merged.get("tried"), Some("s1,s2"));
//! ```

pub mod cgi;
pub mod error;
pub mod flags;
pub mod message;
pub mod path;
pub mod replies;
pub mod request;
pub mod response;
pub mod xattr;

// Re-export main types
pub use cgi::CgiMap;
pub use error::{Error, FailureKind, Result};
pub use flags::{
    AccessMode, DirListFlags, MkDirFlags, OpenFlags, PrepareFlags, QueryCode, StatFlags,
};
pub use message::{Failure, Outcome, RedirectSignal, Reply};
pub use path::build_path;
pub use replies::{
    Decode, DirEntry, DirectoryList, Location, LocationAccess, LocationInfo, LocationKind,
    ProtocolInfo, StatInfo, StatInfoVfs,
};
pub use request::{Frame, OpKind, Payload, Request};
pub use response::{HostInfo, HostList, Response, Status};
pub use xattr::AttributeEntry;
