//! Page requests and the page shapes handed back to the UI.

use std::fmt;

use crate::error::{Error, Result};

/// Default number of items per page in the browser views.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// What the caller wants next from a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Scan cursor from the previous page; 0 starts a new iteration.
    pub cursor: u64,
    /// Maximum number of items wanted.
    pub size: usize,
    /// Glob filter; empty means no filter.
    pub keywords: String,
    /// 1-based page number, used only by list offset paging.
    pub current: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: 0,
            size: DEFAULT_PAGE_SIZE,
            keywords: String::new(),
            current: 1,
        }
    }
}

impl PageRequest {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_cursor(mut self, cursor: u64) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_current(mut self, current: usize) -> Self {
        self.current = current;
        self
    }

    /// The MATCH pattern to send, if any.
    pub fn pattern(&self) -> Option<&str> {
        (!self.keywords.is_empty()).then_some(self.keywords.as_str())
    }

    /// Request for the page following `page`, keeping size and filter.
    pub fn next_after<T>(&self, page: &Page<T>) -> Self {
        Self {
            cursor: page.cursor,
            current: self.current + 1,
            ..self.clone()
        }
    }

    /// Closed LRANGE bounds for list paging: page N of size S covers
    /// `[(N-1)*S, (N-1)*S + S - 1]`. Page 0 is treated as page 1.
    ///
    /// Fails for size 0 and for offsets past what LRANGE can address.
    pub fn list_range(&self) -> Result<(i64, i64)> {
        if self.size == 0 {
            return Err(Error::InvalidRequest("page size must be positive".into()));
        }
        let out_of_range = || {
            Error::InvalidRequest(format!(
                "page {} of size {} is out of range",
                self.current, self.size
            ))
        };
        let size = i64::try_from(self.size).map_err(|_| out_of_range())?;
        let index = i64::try_from(self.current.max(1) - 1).map_err(|_| out_of_range())?;
        let start = index.checked_mul(size).ok_or_else(out_of_range)?;
        let stop = start.checked_add(size - 1).ok_or_else(out_of_range)?;
        Ok((start, stop))
    }
}

/// One assembled page of a cursor-scanned collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cardinality of the whole collection or keyspace.
    pub total: u64,
    /// Cursor to continue from; 0 when the scan is complete.
    pub cursor: u64,
}

impl<T> Page<T> {
    /// More items remain exactly when the server handed back a live cursor.
    pub fn has_next(&self) -> bool {
        self.cursor != 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A page of list elements fetched by offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<String>,
    /// LLEN at the time of the fetch.
    pub total: u64,
    /// First offset requested.
    pub start: i64,
    /// Last offset requested (inclusive).
    pub stop: i64,
}

/// Redis value type as reported by TYPE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    List,
    Set,
    Hash,
    ZSet,
    /// The key vanished between SCAN and TYPE.
    None,
    /// Types the browser shows but does not edit (stream, module types).
    Other(String),
}

impl KeyType {
    pub fn parse(s: &str) -> Self {
        match s {
            "string" => Self::String,
            "list" => Self::List,
            "set" => Self::Set,
            "hash" => Self::Hash,
            "zset" => Self::ZSet,
            "none" => Self::None,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::ZSet => "zset",
            Self::None => "none",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key name with its type, built per page of key listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub key: String,
    pub key_type: KeyType,
}

impl KeyDescriptor {
    pub fn new(key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            key: key.into(),
            key_type,
        }
    }
}
