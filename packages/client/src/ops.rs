//! Operation descriptors.
//!
//! Each descriptor validates its arguments, turns them into a [`Request`]
//! and names the type its reply decodes into. Paths given here are already
//! absolute; [`FileSystem`](crate::FileSystem) resolves relative ones first.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use hopline_wire::xattr::{self, AttributeEntry};
use hopline_wire::{
    AccessMode, CgiMap, Decode, DirListFlags, DirectoryList, Error, LocationInfo, MkDirFlags,
    OpKind, OpenFlags, Payload, PrepareFlags, ProtocolInfo, QueryCode, Request, Result, StatInfo,
    StatInfoVfs,
};

/// Something the dispatcher can run.
pub trait Operation: Send + 'static {
    type Output: Decode;

    fn into_request(self) -> Result<Request>;

    /// Give this operation its own timeout instead of the configured one.
    fn with_timeout(self, timeout: Duration) -> Timed<Self>
    where
        Self: Sized,
    {
        Timed { op: self, timeout }
    }
}

/// An operation with an explicit timeout.
#[derive(Debug, Clone)]
pub struct Timed<O> {
    op: O,
    timeout: Duration,
}

impl<O: Operation> Operation for Timed<O> {
    type Output = O::Output;

    fn into_request(self) -> Result<Request> {
        Ok(self.op.into_request()?.with_timeout(self.timeout))
    }
}

/// Build a request for `path`, splitting off an inline query string.
fn at_path(kind: OpKind, path: &str) -> Result<Request> {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };
    if !path.starts_with('/') {
        return Err(Error::invalid(format!(
            "{} needs an absolute path, got '{}'",
            kind, path
        )));
    }
    if path.contains('\0') {
        return Err(Error::invalid("path contains a NUL byte"));
    }

    let mut request = Request::new(kind, path);
    if let Some(query) = query {
        request.cgi = CgiMap::parse(query);
    }
    Ok(request)
}

fn raw(build: impl FnOnce(&mut BytesMut)) -> Payload {
    let mut buf = BytesMut::new();
    build(&mut buf);
    Payload::Raw(buf.freeze())
}

macro_rules! path_op {
    ($(#[$meta:meta])* $name:ident => $kind:ident, $output:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub path: String,
        }

        impl $name {
            pub fn new(path: impl Into<String>) -> Self {
                Self { path: path.into() }
            }
        }

        impl Operation for $name {
            type Output = $output;

            fn into_request(self) -> Result<Request> {
                at_path(OpKind::$kind, &self.path)
            }
        }
    };
}

path_op! {
    /// Stat a file or directory.
    Stat => Stat, StatInfo
}

path_op! {
    /// Virtual file system statistics for the space holding a path.
    StatVfs => StatVfs, StatInfoVfs
}

path_op! {
    /// Remove a file.
    Rm => Rm, ()
}

path_op! {
    /// Remove an empty directory.
    RmDir => RmDir, ()
}

/// Find the servers holding a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locate {
    pub path: String,
    pub flags: OpenFlags,
}

impl Locate {
    pub fn new(path: impl Into<String>, flags: OpenFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }
}

impl Operation for Locate {
    type Output = LocationInfo;

    fn into_request(self) -> Result<Request> {
        let flags = self.flags.bits();
        Ok(at_path(OpKind::Locate, &self.path)?.with_payload(raw(|b| b.put_u16(flags))))
    }
}

/// Move or rename within one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mv {
    pub source: String,
    pub dest: String,
}

impl Mv {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

impl Operation for Mv {
    type Output = ();

    fn into_request(self) -> Result<Request> {
        // The destination travels in the body and is validated like a path.
        let dest = at_path(OpKind::Mv, &self.dest)?.target();
        Ok(at_path(OpKind::Mv, &self.source)?.with_payload(Payload::Raw(Bytes::from(dest))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkDir {
    pub path: String,
    pub flags: MkDirFlags,
    pub mode: AccessMode,
}

impl MkDir {
    pub fn new(path: impl Into<String>, flags: MkDirFlags, mode: AccessMode) -> Self {
        Self {
            path: path.into(),
            flags,
            mode,
        }
    }
}

impl Operation for MkDir {
    type Output = ();

    fn into_request(self) -> Result<Request> {
        let (flags, mode) = (self.flags.bits(), self.mode.bits());
        Ok(at_path(OpKind::MkDir, &self.path)?.with_payload(raw(|b| {
            b.put_u8(flags);
            b.put_u16(mode);
        })))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChMod {
    pub path: String,
    pub mode: AccessMode,
}

impl ChMod {
    pub fn new(path: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }
}

impl Operation for ChMod {
    type Output = ();

    fn into_request(self) -> Result<Request> {
        let mode = self.mode.bits();
        Ok(at_path(OpKind::ChMod, &self.path)?.with_payload(raw(|b| b.put_u16(mode))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncate {
    pub path: String,
    pub size: u64,
}

impl Truncate {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

impl Operation for Truncate {
    type Output = ();

    fn into_request(self) -> Result<Request> {
        let size = self.size;
        Ok(at_path(OpKind::Truncate, &self.path)?.with_payload(raw(|b| b.put_u64(size))))
    }
}

/// Check that the server is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl Operation for Ping {
    type Output = ();

    fn into_request(self) -> Result<Request> {
        Ok(Request::new(OpKind::Ping, ""))
    }
}

/// Ask for the server's protocol version and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protocol;

impl Operation for Protocol {
    type Output = ProtocolInfo;

    fn into_request(self) -> Result<Request> {
        Ok(Request::new(OpKind::Protocol, ""))
    }
}

/// Server-side query; the answer is returned as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub code: QueryCode,
    pub arg: Bytes,
}

impl Query {
    pub fn new(code: QueryCode, arg: impl Into<Bytes>) -> Self {
        Self {
            code,
            arg: arg.into(),
        }
    }
}

impl Operation for Query {
    type Output = Bytes;

    fn into_request(self) -> Result<Request> {
        let Query { code, arg } = self;
        Ok(Request::new(OpKind::Query, "").with_payload(raw(|b| {
            b.put_u16(code.code());
            b.put_slice(&arg);
        })))
    }
}

/// Stage files or cancel staging. Answers with a request locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub files: Vec<String>,
    pub flags: PrepareFlags,
    pub priority: u8,
}

impl Prepare {
    pub fn new(files: Vec<String>, flags: PrepareFlags, priority: u8) -> Self {
        Self {
            files,
            flags,
            priority,
        }
    }
}

impl Operation for Prepare {
    type Output = Bytes;

    fn into_request(self) -> Result<Request> {
        if self.files.is_empty() {
            return Err(Error::invalid("prepare needs at least one file"));
        }
        if self.priority > 3 {
            return Err(Error::invalid(format!(
                "prepare priority must be 0-3, got {}",
                self.priority
            )));
        }
        if let Some(bad) = self.files.iter().find(|f| f.is_empty() || f.contains('\n')) {
            return Err(Error::invalid(format!("invalid file name {:?}", bad)));
        }

        let (flags, priority) = (self.flags.bits(), self.priority);
        let list = self.files.join("\n");
        Ok(Request::new(OpKind::Prepare, "").with_payload(raw(|b| {
            b.put_u16(flags);
            b.put_u8(priority);
            b.put_slice(list.as_bytes());
        })))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirList {
    pub path: String,
    pub flags: DirListFlags,
}

impl DirList {
    pub fn new(path: impl Into<String>, flags: DirListFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }
}

impl Operation for DirList {
    type Output = DirectoryList;

    fn into_request(self) -> Result<Request> {
        let flags = self.flags.bits();
        Ok(at_path(OpKind::DirList, &self.path)?.with_payload(raw(|b| b.put_u8(flags))))
    }
}

fn check_batch(what: &str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::invalid(format!("{} needs at least one attribute", what)));
    }
    if len > xattr::MAX_ENTRIES {
        return Err(Error::invalid(format!(
            "{} takes at most {} attributes, got {}",
            what,
            xattr::MAX_ENTRIES,
            len
        )));
    }
    Ok(())
}

/// Set extended attributes. The reply carries a status per attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetXAttr {
    pub path: String,
    pub attrs: Vec<(String, Vec<u8>)>,
}

impl SetXAttr {
    pub fn new(path: impl Into<String>, attrs: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            path: path.into(),
            attrs,
        }
    }
}

impl Operation for SetXAttr {
    type Output = Vec<AttributeEntry>;

    fn into_request(self) -> Result<Request> {
        check_batch("set-xattr", self.attrs.len())?;
        let entries = self
            .attrs
            .into_iter()
            .map(|(name, value)| AttributeEntry::with_value(name, value))
            .collect();
        Ok(at_path(OpKind::SetXAttr, &self.path)?.with_payload(Payload::Attributes(entries)))
    }
}

/// Read extended attributes by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetXAttr {
    pub path: String,
    pub names: Vec<String>,
}

impl GetXAttr {
    pub fn new(path: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            names,
        }
    }
}

impl Operation for GetXAttr {
    type Output = Vec<AttributeEntry>;

    fn into_request(self) -> Result<Request> {
        check_batch("get-xattr", self.names.len())?;
        let entries = self.names.into_iter().map(AttributeEntry::name).collect();
        Ok(at_path(OpKind::GetXAttr, &self.path)?.with_payload(Payload::Attributes(entries)))
    }
}

/// Delete extended attributes by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelXAttr {
    pub path: String,
    pub names: Vec<String>,
}

impl DelXAttr {
    pub fn new(path: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            names,
        }
    }
}

impl Operation for DelXAttr {
    type Output = Vec<AttributeEntry>;

    fn into_request(self) -> Result<Request> {
        check_batch("del-xattr", self.names.len())?;
        let entries = self.names.into_iter().map(AttributeEntry::name).collect();
        Ok(at_path(OpKind::DelXAttr, &self.path)?.with_payload(Payload::Attributes(entries)))
    }
}

/// List every extended attribute with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListXAttr {
    pub path: String,
}

impl ListXAttr {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Operation for ListXAttr {
    type Output = Vec<AttributeEntry>;

    fn into_request(self) -> Result<Request> {
        // An empty record list still frames the target path.
        Ok(at_path(OpKind::ListXAttr, &self.path)?.with_payload(Payload::Attributes(Vec::new())))
    }
}

/// Longest info string a set request accepts, in characters.
pub const MAX_INFO_LEN: usize = 1024;

fn set_request(prefix: &str, info: &str) -> Result<Request> {
    let len = info.chars().count();
    if len > MAX_INFO_LEN {
        return Err(Error::invalid(format!(
            "info string is {} characters long, at most {} are allowed",
            len, MAX_INFO_LEN
        )));
    }
    let line = format!("{}{}", prefix, info);
    Ok(Request::new(OpKind::Set, "").with_payload(Payload::Raw(Bytes::from(line))))
}

/// Send client information to the server for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendInfo {
    pub info: String,
}

impl SendInfo {
    pub fn new(info: impl Into<String>) -> Self {
        Self { info: info.into() }
    }
}

impl Operation for SendInfo {
    type Output = Bytes;

    fn into_request(self) -> Result<Request> {
        set_request("monitor info ", &self.info)
    }
}

/// Send cache directives to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCache {
    pub info: String,
}

impl SendCache {
    pub fn new(info: impl Into<String>) -> Self {
        Self { info: info.into() }
    }
}

impl Operation for SendCache {
    type Output = Bytes;

    fn into_request(self) -> Result<Request> {
        set_request("cache ", &self.info)
    }
}
