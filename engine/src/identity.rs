//! Identity resolution between the two record sets.
//!
//! Records are the same tree only when their ids are equal. No fallback on
//! name, GPS proximity or QR code is attempted: if the stores ever used
//! unrelated id schemes, every record would surface as one-sided instead of
//! two distinct trees being merged.

use crate::{RecordSet, TreeRecord};
use std::cmp::Ordering;

/// One resolved identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// Both stores hold a copy
    Both {
        mobile: &'a TreeRecord,
        cloud: &'a TreeRecord,
    },
    /// Only the mobile store holds the record
    MobileOnly(&'a TreeRecord),
    /// Only the cloud store holds the record
    CloudOnly(&'a TreeRecord),
}

impl<'a> Resolved<'a> {
    pub fn id(&self) -> &'a str {
        match *self {
            Resolved::Both { mobile, .. } => &mobile.id,
            Resolved::MobileOnly(record) | Resolved::CloudOnly(record) => &record.id,
        }
    }
}

/// Pair the two sets by exact id.
///
/// Every id of either set appears exactly once in the output, in ascending
/// id order.
pub fn resolve<'a>(mobile: &'a RecordSet, cloud: &'a RecordSet) -> Vec<Resolved<'a>> {
    let mut out = Vec::with_capacity(mobile.len().max(cloud.len()));
    let mut m = mobile.iter().peekable();
    let mut c = cloud.iter().peekable();

    loop {
        let next = match (m.peek().copied(), c.peek().copied()) {
            (Some(mr), Some(cr)) => match mr.id.cmp(&cr.id) {
                Ordering::Less => {
                    m.next();
                    Resolved::MobileOnly(mr)
                }
                Ordering::Greater => {
                    c.next();
                    Resolved::CloudOnly(cr)
                }
                Ordering::Equal => {
                    m.next();
                    c.next();
                    Resolved::Both {
                        mobile: mr,
                        cloud: cr,
                    }
                }
            },
            (Some(mr), None) => {
                m.next();
                Resolved::MobileOnly(mr)
            }
            (None, Some(cr)) => {
                c.next();
                Resolved::CloudOnly(cr)
            }
            (None, None) => break,
        };
        out.push(next);
    }

    out
}
