//! Resource vectors shared by servers, services and packages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One dimension of a resource vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Ram,
    Cores,
    Disk,
    Bandwidth,
}

impl Resource {
    /// Every dimension, in a fixed order.
    pub const ALL: [Resource; 4] = [
        Resource::Ram,
        Resource::Cores,
        Resource::Disk,
        Resource::Bandwidth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ram => "ram",
            Self::Cores => "cores",
            Self::Disk => "disk",
            Self::Bandwidth => "bandwidth",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{ram, cores, disk, bandwidth}` vector.
///
/// On a server this is total capacity; on a service or package it is the
/// amount the service reserves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specs {
    pub ram: u64,
    pub cores: u64,
    pub disk: u64,
    pub bandwidth: u64,
}

impl Specs {
    pub const ZERO: Specs = Specs {
        ram: 0,
        cores: 0,
        disk: 0,
        bandwidth: 0,
    };

    pub const fn new(ram: u64, cores: u64, disk: u64, bandwidth: u64) -> Self {
        Self {
            ram,
            cores,
            disk,
            bandwidth,
        }
    }

    pub fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Ram => self.ram,
            Resource::Cores => self.cores,
            Resource::Disk => self.disk,
            Resource::Bandwidth => self.bandwidth,
        }
    }

    fn map2(self, other: Specs, f: impl Fn(u64, u64) -> u64) -> Specs {
        Specs {
            ram: f(self.ram, other.ram),
            cores: f(self.cores, other.cores),
            disk: f(self.disk, other.disk),
            bandwidth: f(self.bandwidth, other.bandwidth),
        }
    }

    /// Dimension-wise sum, saturating at `u64::MAX`.
    pub fn saturating_add(self, other: Specs) -> Specs {
        self.map2(other, u64::saturating_add)
    }

    /// Dimension-wise difference, saturating at zero.
    pub fn saturating_sub(self, other: Specs) -> Specs {
        self.map2(other, u64::saturating_sub)
    }

    /// True iff every dimension of `self` is at most the same dimension of `limit`.
    pub fn fits_within(&self, limit: &Specs) -> bool {
        Resource::ALL
            .iter()
            .all(|&r| self.get(r) <= limit.get(r))
    }

    /// The first dimension in which `self` exceeds `limit`, if any.
    pub fn first_excess(&self, limit: &Specs) -> Option<Resource> {
        Resource::ALL
            .into_iter()
            .find(|&r| self.get(r) > limit.get(r))
    }
}

impl std::iter::Sum for Specs {
    fn sum<I: Iterator<Item = Specs>>(iter: I) -> Specs {
        iter.fold(Specs::ZERO, Specs::saturating_add)
    }
}

impl fmt::Display for Specs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ram={} cores={} disk={} bandwidth={}",
            self.ram, self.cores, self.disk, self.bandwidth
        )
    }
}
