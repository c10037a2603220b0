//! Page ranges: the unit of work submitted to the OCR service.
//!
//! A [`PageRange`] is a non-empty, ordered list of zero-indexed page numbers.
//! Splitting never reorders or drops pages, so reassembling the text of the
//! two halves in order always reproduces page order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-empty ordered list of zero-indexed page numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct PageRange(Vec<usize>);

impl PageRange {
    /// Wrap a page list. Returns `None` when `pages` is empty.
    pub fn new(pages: Vec<usize>) -> Option<Self> {
        if pages.is_empty() {
            None
        } else {
            Some(Self(pages))
        }
    }

    /// Every page of a `total`-page document: `0..total`.
    pub fn full(total: usize) -> Option<Self> {
        Self::new((0..total).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> usize {
        self.0[0]
    }

    pub fn last(&self) -> usize {
        self.0[self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.clone()
    }

    /// True when this is exactly `0..total`.
    pub fn covers(&self, total: usize) -> bool {
        self.0.len() == total && self.0.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Bisect at the midpoint.
    ///
    /// The first half gets `len / 2` pages, the second half the remainder,
    /// so for odd lengths the second half is one page longer. Returns `None`
    /// for single-page ranges, which cannot yield two non-empty halves.
    pub fn split(&self) -> Option<(PageRange, PageRange)> {
        if self.0.len() < 2 {
            return None;
        }
        let mid = self.0.len() / 2;
        let (a, b) = self.0.split_at(mid);
        Some((PageRange(a.to_vec()), PageRange(b.to_vec())))
    }
}

impl TryFrom<Vec<usize>> for PageRange {
    type Error = &'static str;

    fn try_from(pages: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(pages).ok_or("page range must not be empty")
    }
}

impl From<PageRange> for Vec<usize> {
    fn from(range: PageRange) -> Self {
        range.0
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first(), self.last())
    }
}
