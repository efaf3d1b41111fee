use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id, Range};

/// Which candidate tier produced the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelSpan {
    Cluster,
    Region,
    Galaxy,
    Manual,
}

impl TunnelSpan {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelSpan::Cluster => "cluster",
            TunnelSpan::Region => "region",
            TunnelSpan::Galaxy => "galaxy",
            TunnelSpan::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cluster" => Some(TunnelSpan::Cluster),
            "region" => Some(TunnelSpan::Region),
            "galaxy" => Some(TunnelSpan::Galaxy),
            "manual" => Some(TunnelSpan::Manual),
            _ => None,
        }
    }
}

/// Physical character of a tunnel. Drawn per tunnel during connectivity building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    #[default]
    Standard,
    Quantum,
    Ancient,
    Artificial,
    Unstable,
}

impl TunnelKind {
    pub const ALL: [TunnelKind; 5] = [
        TunnelKind::Standard,
        TunnelKind::Quantum,
        TunnelKind::Ancient,
        TunnelKind::Artificial,
        TunnelKind::Unstable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelKind::Standard => "standard",
            TunnelKind::Quantum => "quantum",
            TunnelKind::Ancient => "ancient",
            TunnelKind::Artificial => "artificial",
            TunnelKind::Unstable => "unstable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(TunnelKind::Standard),
            "quantum" => Some(TunnelKind::Quantum),
            "ancient" => Some(TunnelKind::Ancient),
            "artificial" => Some(TunnelKind::Artificial),
            "unstable" => Some(TunnelKind::Unstable),
            _ => None,
        }
    }

    /// Relative draw weight.
    pub fn weight(&self) -> u32 {
        match self {
            TunnelKind::Standard => 60,
            TunnelKind::Quantum => 15,
            TunnelKind::Ancient => 10,
            TunnelKind::Artificial => 8,
            TunnelKind::Unstable => 5,
        }
    }

    /// Characteristic stability of the kind on the absolute [0, 1] scale.
    pub fn stability_band(&self) -> Range<f64> {
        match self {
            TunnelKind::Standard => Range::new(0.9, 1.0),
            TunnelKind::Quantum => Range::new(0.7, 0.9),
            TunnelKind::Ancient => Range::new(0.5, 0.8),
            TunnelKind::Artificial => Range::new(0.8, 0.95),
            TunnelKind::Unstable => Range::new(0.3, 0.6),
        }
    }

    /// Narrow `range` to the part this kind occupies.
    ///
    /// The band is intersected with `range`. When they do not overlap the band's
    /// relative position is mapped into `range` instead, so region and override
    /// limits always win.
    pub fn narrow(&self, range: Range<f64>) -> Range<f64> {
        let (low, high) = if range.is_ordered() {
            (range.min, range.max)
        } else {
            (range.max, range.min)
        };
        let band = self.stability_band();
        let (min, max) = (band.min.max(low), band.max.min(high));
        if min <= max {
            return Range::new(min, max);
        }
        let span = high - low;
        Range::new(
            (low + span * band.min).min(high),
            (low + span * band.max).min(high),
        )
    }

    pub fn turn_multiplier(&self) -> f64 {
        match self {
            TunnelKind::Standard => 1.0,
            TunnelKind::Quantum => 0.5,
            TunnelKind::Ancient => 0.8,
            TunnelKind::Artificial => 0.7,
            TunnelKind::Unstable => 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpTunnel {
    pub id: Id,
    pub galaxy_id: Id,
    pub source_sector_id: Id,
    pub target_sector_id: Id,
    pub stability: f64,
    pub span: TunnelSpan,
    #[serde(default)]
    pub kind: TunnelKind,
    pub turn_cost: u32,
    pub is_bidirectional: bool,
    pub created_at: DateTime<Utc>,
}

impl WarpTunnel {
    pub fn new(
        galaxy_id: Id,
        source_sector_id: Id,
        target_sector_id: Id,
        stability: f64,
        span: TunnelSpan,
        turn_cost: u32,
    ) -> Self {
        Self {
            id: generate_id(),
            galaxy_id,
            source_sector_id,
            target_sector_id,
            stability,
            span,
            kind: TunnelKind::Standard,
            turn_cost,
            is_bidirectional: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: TunnelKind) -> Self {
        self.kind = kind;
        self
    }

    /// Order-independent identity of the connected pair.
    pub fn pair_key(&self) -> (Id, Id) {
        pair_key(&self.source_sector_id, &self.target_sector_id)
    }

    pub fn other_end(&self, sector_id: &str) -> Option<&Id> {
        if self.source_sector_id == sector_id {
            Some(&self.target_sector_id)
        } else if self.target_sector_id == sector_id {
            Some(&self.source_sector_id)
        } else {
            None
        }
    }
}

pub fn pair_key(a: &Id, b: &Id) -> (Id, Id) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Turn cost grows with distance and the worse endpoint hazard, scaled by the tunnel kind.
pub fn turn_cost(distance: f64, max_hazard: u8, kind: TunnelKind) -> u32 {
    let distance_cost = ((distance / 10.0).floor() as u32).max(1);
    let base = ((distance_cost as f64 * kind.turn_multiplier()).floor() as u32).max(1);
    let hazard_penalty = match max_hazard {
        0..=5 => 0,
        6..=7 => 1,
        _ => 2,
    };
    base + hazard_penalty
}
