//! Bit flags and small enumerations carried by operation arguments.

use std::ops::{BitOr, BitOrAssign};

use crate::error::{Error, Result};

macro_rules! flag_set {
    (
        $(#[$meta:meta])* $name:ident : $repr:ty {
            $($(#[$fmeta:meta])* $flag:ident = $value:expr,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub $repr);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name($value);)*

            pub fn bits(&self) -> $repr {
                self.0
            }

            pub fn contains(&self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

flag_set! {
    /// Flags for locate requests.
    OpenFlags: u16 {
        NO_WAIT = 0x0008,
        REFRESH = 0x0080,
        FORCE = 0x0100,
        PREF_NAME = 0x0200,
    }
}

flag_set! {
    MkDirFlags: u8 {
        /// Create missing parent directories.
        MAKE_PATH = 0x01,
    }
}

flag_set! {
    DirListFlags: u8 {
        /// Ask for a stat line per entry.
        STAT = 0x01,
        LOCATE = 0x02,
        RECURSIVE = 0x04,
        MERGE = 0x08,
        CHUNKED = 0x10,
    }
}

flag_set! {
    PrepareFlags: u16 {
        CANCEL = 0x0001,
        NOTIFY = 0x0002,
        NO_ERRS = 0x0004,
        STAGE = 0x0008,
        WRITE_MODE = 0x0010,
        COLOCATE = 0x0020,
        FRESH = 0x0040,
        EVICT = 0x0100,
    }
}

flag_set! {
    /// Unix-like permission bits.
    AccessMode: u16 {
        UR = 0o400,
        UW = 0o200,
        UX = 0o100,
        GR = 0o040,
        GW = 0o020,
        GX = 0o010,
        OR = 0o004,
        OW = 0o002,
        OX = 0o001,
    }
}

impl AccessMode {
    /// Parse a nine character mode string such as `rwxr-x---`.
    pub fn parse(mode: &str) -> Result<Self> {
        const BITS: [(u8, AccessMode); 9] = [
            (b'r', AccessMode::UR),
            (b'w', AccessMode::UW),
            (b'x', AccessMode::UX),
            (b'r', AccessMode::GR),
            (b'w', AccessMode::GW),
            (b'x', AccessMode::GX),
            (b'r', AccessMode::OR),
            (b'w', AccessMode::OW),
            (b'x', AccessMode::OX),
        ];

        if mode.len() != BITS.len() {
            return Err(Error::invalid(format!(
                "access mode '{}' must have 9 characters",
                mode
            )));
        }

        let mut parsed = AccessMode::NONE;
        for (c, (expected, bit)) in mode.bytes().zip(BITS) {
            if c == expected {
                parsed |= bit;
            } else if c != b'-' {
                return Err(Error::invalid(format!(
                    "unexpected '{}' in access mode '{}'",
                    c as char, mode
                )));
            }
        }
        Ok(parsed)
    }
}

flag_set! {
    /// Flags reported in a stat answer.
    StatFlags: u32 {
        X_BIT_SET = 1,
        IS_DIR = 2,
        OTHER = 4,
        OFFLINE = 8,
        IS_READABLE = 16,
        IS_WRITABLE = 32,
        POSC_PENDING = 64,
        BACKUP_EXISTS = 128,
    }
}

const STAT_FLAG_NAMES: [(&str, StatFlags); 8] = [
    ("XBitSet", StatFlags::X_BIT_SET),
    ("IsDir", StatFlags::IS_DIR),
    ("Other", StatFlags::OTHER),
    ("Offline", StatFlags::OFFLINE),
    ("POSCPending", StatFlags::POSC_PENDING),
    ("IsReadable", StatFlags::IS_READABLE),
    ("IsWritable", StatFlags::IS_WRITABLE),
    ("BackUpExists", StatFlags::BACKUP_EXISTS),
];

impl StatFlags {
    /// Names of the set flags joined by `|`, e.g. `IsDir|IsReadable`.
    pub fn names(&self) -> String {
        STAT_FLAG_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Parse a `|` separated list of flag names.
    pub fn parse_names(names: &str) -> Result<Self> {
        let mut flags = StatFlags::NONE;
        for name in names.split('|').map(str::trim).filter(|n| !n.is_empty()) {
            let (_, flag) = STAT_FLAG_NAMES
                .iter()
                .find(|(known, _)| *known == name)
                .ok_or_else(|| Error::invalid(format!("unknown stat flag '{}'", name)))?;
            flags |= *flag;
        }
        Ok(flags)
    }
}

/// What a query request asks the server for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryCode {
    Config,
    ChecksumCancel,
    Checksum,
    Opaque,
    OpaqueFile,
    Prepare,
    Space,
    Stats,
    Visa,
    XAttr,
}

impl QueryCode {
    pub fn code(&self) -> u16 {
        match self {
            QueryCode::Stats => 1,
            QueryCode::Prepare => 2,
            QueryCode::Checksum => 3,
            QueryCode::XAttr => 4,
            QueryCode::Space => 5,
            QueryCode::ChecksumCancel => 6,
            QueryCode::Config => 7,
            QueryCode::Visa => 8,
            QueryCode::Opaque => 16,
            QueryCode::OpaqueFile => 32,
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "config" => Ok(QueryCode::Config),
            "checksumcancel" => Ok(QueryCode::ChecksumCancel),
            "checksum" => Ok(QueryCode::Checksum),
            "opaque" => Ok(QueryCode::Opaque),
            "opaquefile" => Ok(QueryCode::OpaqueFile),
            "prepare" => Ok(QueryCode::Prepare),
            "space" => Ok(QueryCode::Space),
            "stats" => Ok(QueryCode::Stats),
            "visa" => Ok(QueryCode::Visa),
            "xattr" => Ok(QueryCode::XAttr),
            other => Err(Error::invalid(format!("unknown query code '{}'", other))),
        }
    }
}
