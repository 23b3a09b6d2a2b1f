//! Spatial/temporal layer filtering for VP9 SVC streams.

use log::trace;
use rtp::codec::vp9::Vp9PayloadDescriptor;
use shared::error::{Error, Result};

/// A scalability mode such as `L2T3` or `L3T3_KEY` as carried in SDP.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScalabilityMode {
    pub spatial_layers: u8,
    pub temporal_layers: u8,
    pub key_picture: bool,
}

impl ScalabilityMode {
    /// Parses the `LxTy[_KEY]` form.
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix('L')
            .ok_or_else(|| Error::ErrInvalidScalabilityMode)?;
        let (spatial, rest) = rest
            .split_once('T')
            .ok_or_else(|| Error::ErrInvalidScalabilityMode)?;
        let (temporal, key_picture) = match rest.strip_suffix("_KEY") {
            Some(t) => (t, true),
            None => (rest, false),
        };

        let spatial_layers: u8 = spatial
            .parse()
            .map_err(|_| Error::ErrInvalidScalabilityMode)?;
        let temporal_layers: u8 = temporal
            .parse()
            .map_err(|_| Error::ErrInvalidScalabilityMode)?;
        if spatial_layers == 0 || temporal_layers == 0 {
            return Err(Error::ErrInvalidScalabilityMode);
        }

        Ok(ScalabilityMode {
            spatial_layers,
            temporal_layers,
            key_picture,
        })
    }
}

impl std::fmt::Display for ScalabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L{}T{}{}",
            self.spatial_layers,
            self.temporal_layers,
            if self.key_picture { "_KEY" } else { "" }
        )
    }
}

/// Per-filter forwarding counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LayerFilterStats {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
}

/// Vp9LayerFilter drops packets above the selected spatial/temporal layers.
///
/// Narrowing the selection waits for a keyframe so the downstream decoder
/// never sees a layer switch mid-GOP; widening applies immediately.
pub struct Vp9LayerFilter {
    max_spatial: u8,
    max_temporal: u8,

    /// A pending narrower selection, applied at the next keyframe.
    pending_spatial: Option<u8>,
    pending_temporal: Option<u8>,

    stats: LayerFilterStats,
}

impl Vp9LayerFilter {
    pub fn new(max_spatial: u8, max_temporal: u8) -> Self {
        Vp9LayerFilter {
            max_spatial,
            max_temporal,
            pending_spatial: None,
            pending_temporal: None,
            stats: LayerFilterStats::default(),
        }
    }

    pub fn from_mode(mode: ScalabilityMode) -> Self {
        Vp9LayerFilter::new(mode.spatial_layers - 1, mode.temporal_layers - 1)
    }

    pub fn stats(&self) -> LayerFilterStats {
        self.stats
    }

    pub fn selection(&self) -> (u8, u8) {
        (self.max_spatial, self.max_temporal)
    }

    /// Requests a new layer selection. Widening takes effect immediately;
    /// narrowing is deferred until a keyframe arrives.
    pub fn select_layers(&mut self, max_spatial: u8, max_temporal: u8) {
        if max_spatial >= self.max_spatial {
            self.max_spatial = max_spatial;
            self.pending_spatial = None;
        } else {
            self.pending_spatial = Some(max_spatial);
        }

        if max_temporal >= self.max_temporal {
            self.max_temporal = max_temporal;
            self.pending_temporal = None;
        } else {
            self.pending_temporal = Some(max_temporal);
        }
    }

    /// Decides whether a packet passes the filter. Undecodable descriptors
    /// drop the packet.
    pub fn filter(&mut self, payload: &[u8]) -> bool {
        self.stats.received += 1;

        let descriptor = match Vp9PayloadDescriptor::unmarshal(payload) {
            Ok(d) => d,
            Err(_) => {
                self.stats.dropped += 1;
                return false;
            }
        };

        if descriptor.is_keyframe() {
            // a fresh decode point: pending downgrades become effective
            if let Some(spatial) = self.pending_spatial.take() {
                trace!("vp9 filter: applying pending spatial limit {spatial}");
                self.max_spatial = spatial;
            }
            if let Some(temporal) = self.pending_temporal.take() {
                trace!("vp9 filter: applying pending temporal limit {temporal}");
                self.max_temporal = temporal;
            }
        }

        let forward =
            descriptor.spatial_id <= self.max_spatial && descriptor.temporal_id <= self.max_temporal;
        if forward {
            self.stats.forwarded += 1;
        } else {
            self.stats.dropped += 1;
        }
        forward
    }
}

#[cfg(test)]
mod svc_test {
    use super::*;

    #[test]
    fn test_scalability_mode_parse() {
        let mode = ScalabilityMode::parse("L2T3").unwrap();
        assert_eq!(mode.spatial_layers, 2);
        assert_eq!(mode.temporal_layers, 3);
        assert!(!mode.key_picture);

        let key = ScalabilityMode::parse("L3T3_KEY").unwrap();
        assert!(key.key_picture);
        assert_eq!(key.to_string(), "L3T3_KEY");

        assert!(ScalabilityMode::parse("T3").is_err());
        assert!(ScalabilityMode::parse("L0T1").is_err());
        assert!(ScalabilityMode::parse("LxTy").is_err());
    }

    /// I=0, P per keyframe, L=1; layer byte carries T and S.
    fn vp9_payload(keyframe: bool, spatial: u8, temporal: u8) -> Vec<u8> {
        let mut b0 = 0x20u8 | 0x08; // L | B
        if !keyframe {
            b0 |= 0x40; // P
        }
        let layer = (temporal << 5) | (spatial << 1);
        vec![b0, layer, 0x00, 0xaa] // layer byte, TL0PICIDX, payload
    }

    #[test]
    fn test_filters_above_selection() {
        let mut f = Vp9LayerFilter::new(0, 0);
        // keyframe on base layer passes
        assert!(f.filter(&vp9_payload(true, 0, 0)));
        // higher spatial layer of the same picture is dropped
        assert!(!f.filter(&vp9_payload(false, 1, 0)));
        assert!(!f.filter(&vp9_payload(false, 0, 1)));
        assert_eq!(f.stats().received, 3);
        assert_eq!(f.stats().forwarded, 1);
        assert_eq!(f.stats().dropped, 2);
    }

    #[test]
    fn test_upgrade_applies_immediately() {
        let mut f = Vp9LayerFilter::new(0, 0);
        f.select_layers(1, 1);
        assert!(f.filter(&vp9_payload(false, 1, 1)));
    }

    #[test]
    fn test_downgrade_waits_for_keyframe() {
        let mut f = Vp9LayerFilter::new(1, 1);
        f.select_layers(0, 0);
        // until a keyframe arrives the old selection stays effective
        assert!(f.filter(&vp9_payload(false, 1, 0)));
        assert_eq!(f.selection(), (1, 1));
        // keyframe commits the downgrade
        assert!(f.filter(&vp9_payload(true, 0, 0)));
        assert_eq!(f.selection(), (0, 0));
        assert!(!f.filter(&vp9_payload(false, 1, 0)));
    }

    #[test]
    fn test_malformed_descriptor_dropped() {
        let mut f = Vp9LayerFilter::new(2, 2);
        assert!(!f.filter(&[]));
        assert_eq!(f.stats().dropped, 1);
    }
}
