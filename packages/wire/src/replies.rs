//! Typed decoders for OK-reply payloads.
//!
//! Each operation kind names the type its reply decodes into; the dispatcher
//! only ever calls [`Decode::decode`] on the final reply of a chain.

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};
use crate::flags::StatFlags;
use crate::message::Reply;
use crate::xattr::{self, AttributeEntry};

/// Conversion from a raw reply into a typed result.
pub trait Decode: Sized + Send + 'static {
    fn decode(reply: Reply) -> Result<Self>;
}

impl Decode for () {
    fn decode(_reply: Reply) -> Result<Self> {
        Ok(())
    }
}

impl Decode for Bytes {
    fn decode(reply: Reply) -> Result<Self> {
        Ok(reply.body)
    }
}

impl Decode for Vec<AttributeEntry> {
    fn decode(reply: Reply) -> Result<Self> {
        xattr::decode(&reply.body)
    }
}

fn fields<'a, const N: usize>(text: &'a str, what: &str) -> Result<[&'a str; N]> {
    let parts: Vec<&'a str> = text.split_whitespace().collect();
    parts.try_into().map_err(|parts: Vec<&'a str>| {
        Error::protocol(format!(
            "{} needs {} fields, got {}: '{}'",
            what,
            N,
            parts.len(),
            text.trim()
        ))
    })
}

fn number<T: std::str::FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| Error::protocol(format!("invalid {} '{}'", what, field)))
}

/// Answer to a stat request: `"<id> <size> <flags> <mtime>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    pub id: String,
    pub size: u64,
    pub flags: StatFlags,
    /// Seconds since the epoch.
    pub mod_time: u64,
}

impl StatInfo {
    pub fn parse(text: &str) -> Result<Self> {
        let [id, size, flags, mod_time] = fields::<4>(text, "stat")?;
        Ok(Self {
            id: id.to_string(),
            size: number(size, "size")?,
            flags: StatFlags(number(flags, "flags")?),
            mod_time: number(mod_time, "modification time")?,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.flags.contains(StatFlags::IS_DIR)
    }

    pub fn test_flags(&self, flags: StatFlags) -> bool {
        self.flags.contains(flags)
    }
}

impl Decode for StatInfo {
    fn decode(reply: Reply) -> Result<Self> {
        StatInfo::parse(reply.text()?)
    }
}

/// Answer to a statvfs request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfoVfs {
    pub nodes_rw: u64,
    /// Megabytes free on the largest read-write partition.
    pub free_rw: u64,
    pub utilization_rw: u8,
    pub nodes_staging: u64,
    pub free_staging: u64,
    pub utilization_staging: u8,
}

impl Decode for StatInfoVfs {
    fn decode(reply: Reply) -> Result<Self> {
        let [nrw, frw, urw, nstg, fstg, ustg] = fields::<6>(reply.text()?, "statvfs")?;
        Ok(Self {
            nodes_rw: number(nrw, "node count")?,
            free_rw: number(frw, "free space")?,
            utilization_rw: number(urw, "utilization")?,
            nodes_staging: number(nstg, "staging node count")?,
            free_staging: number(fstg, "staging free space")?,
            utilization_staging: number(ustg, "staging utilization")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    ManagerOnline,
    ManagerPending,
    ServerOnline,
    ServerPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationAccess {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub address: String,
    pub kind: LocationKind,
    pub access: LocationAccess,
}

impl Location {
    pub fn new(address: impl Into<String>, kind: LocationKind, access: LocationAccess) -> Self {
        Self {
            address: address.into(),
            kind,
            access,
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(
            self.kind,
            LocationKind::ManagerOnline | LocationKind::ManagerPending
        )
    }

    pub fn is_server(&self) -> bool {
        !self.is_manager()
    }

    /// Parse one `<T><A><address>` token, e.g. `Sr10.0.0.1:1094`.
    pub fn parse(token: &str) -> Result<Self> {
        let mut chars = token.chars();
        let kind = match chars.next() {
            Some('M') => LocationKind::ManagerOnline,
            Some('m') => LocationKind::ManagerPending,
            Some('S') => LocationKind::ServerOnline,
            Some('s') => LocationKind::ServerPending,
            _ => return Err(Error::protocol(format!("bad location type in '{}'", token))),
        };
        let access = match chars.next() {
            Some('r') => LocationAccess::Read,
            Some('w') => LocationAccess::ReadWrite,
            _ => {
                return Err(Error::protocol(format!(
                    "bad location access in '{}'",
                    token
                )))
            }
        };
        let address = chars.as_str();
        if address.is_empty() {
            return Err(Error::protocol(format!("location '{}' has no address", token)));
        }
        Ok(Location::new(address, kind, access))
    }

    pub fn to_token(&self) -> String {
        let kind = match self.kind {
            LocationKind::ManagerOnline => 'M',
            LocationKind::ManagerPending => 'm',
            LocationKind::ServerOnline => 'S',
            LocationKind::ServerPending => 's',
        };
        let access = match self.access {
            LocationAccess::Read => 'r',
            LocationAccess::ReadWrite => 'w',
        };
        format!("{}{}{}", kind, access, self.address)
    }
}

/// Answer to a locate request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationInfo {
    pub locations: Vec<Location>,
}

impl LocationInfo {
    pub fn parse(text: &str) -> Result<Self> {
        let locations = text
            .split_whitespace()
            .map(Location::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { locations })
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }
}

impl Decode for LocationInfo {
    fn decode(reply: Reply) -> Result<Self> {
        LocationInfo::parse(reply.text()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub stat: Option<StatInfo>,
}

/// Answer to a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryList {
    pub entries: Vec<DirEntry>,
}

/// Leading lines announcing a listing with a stat line per entry.
const STAT_LISTING_MARKER: [&str; 2] = [".", "0 0 0 0"];

impl DirectoryList {
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();

        if lines.len() >= 2 && lines[..2] == STAT_LISTING_MARKER {
            let rest = &lines[2..];
            if rest.len() % 2 != 0 {
                return Err(Error::protocol(format!(
                    "stat listing has an entry without a stat line: '{}'",
                    rest[rest.len() - 1]
                )));
            }
            let entries = rest
                .chunks(2)
                .map(|pair| {
                    Ok(DirEntry {
                        name: pair[0].to_string(),
                        stat: Some(StatInfo::parse(pair[1])?),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self { entries });
        }

        let entries = lines
            .into_iter()
            .map(|name| DirEntry {
                name: name.to_string(),
                stat: None,
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

impl Decode for DirectoryList {
    fn decode(reply: Reply) -> Result<Self> {
        DirectoryList::parse(reply.text()?)
    }
}

/// Answer to a protocol request: version and server flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub version: u32,
    pub flags: u32,
}

impl Decode for ProtocolInfo {
    fn decode(reply: Reply) -> Result<Self> {
        let mut body = &reply.body[..];
        if body.len() != 8 {
            return Err(Error::protocol(format!(
                "protocol reply must be 8 bytes, got {}",
                body.len()
            )));
        }
        Ok(Self {
            version: body.get_u32(),
            flags: body.get_u32(),
        })
    }
}
