use crate::core::geometry::SegmentId;
use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// A candidate boundary crossing found while resolving one travel segment.
///
/// - `t_travel`: fraction of the travel at which the crossing happens (finite, non-NaN).
/// - `segment`: the segment crossed.
/// - `t_surf`: fraction along the segment.
///
/// Hits order by `t_travel`; equal times resolve to the lower segment id so the first hit
/// does not depend on the order candidates were gathered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHit {
    pub t_travel: NotNan<f64>,
    pub segment: SegmentId,
    pub t_surf: NotNan<f64>,
}

impl SurfaceHit {
    pub fn new(t_travel: f64, segment: SegmentId, t_surf: f64) -> Result<Self> {
        if !t_travel.is_finite() || !t_surf.is_finite() {
            return Err(Error::MathError(format!(
                "non-finite hit parameters ({t_travel}, {t_surf}) on segment {segment}"
            )));
        }
        let t_travel = NotNan::new(t_travel)
            .map_err(|_| Error::MathError("hit time cannot be NaN".into()))?;
        let t_surf = NotNan::new(t_surf)
            .map_err(|_| Error::MathError("hit position cannot be NaN".into()))?;
        Ok(Self {
            t_travel,
            segment,
            t_surf,
        })
    }

    #[inline]
    pub fn t_travel_f64(&self) -> f64 {
        self.t_travel.into_inner()
    }

    #[inline]
    pub fn t_surf_f64(&self) -> f64 {
        self.t_surf.into_inner()
    }
}

impl Ord for SurfaceHit {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.t_travel.cmp(&other.t_travel) {
            Ordering::Equal => (self.segment, self.t_surf).cmp(&(other.segment, other.t_surf)),
            o => o,
        }
    }
}

impl PartialOrd for SurfaceHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nan() {
        let err = SurfaceHit::new(f64::NAN, 0, 0.5).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert!(SurfaceHit::new(0.5, 0, f64::INFINITY).is_err());
    }

    #[test]
    fn earlier_hit_wins() -> Result<()> {
        let a = SurfaceHit::new(0.2, 9, 0.0)?;
        let b = SurfaceHit::new(0.7, 1, 0.0)?;
        assert!(a < b);
        Ok(())
    }

    #[test]
    fn equal_times_prefer_lower_segment() -> Result<()> {
        let hits = [
            SurfaceHit::new(0.5, 4, 0.1)?,
            SurfaceHit::new(0.5, 2, 0.9)?,
            SurfaceHit::new(0.9, 0, 0.5)?,
        ];
        let first = hits.iter().min().copied();
        assert_eq!(first.map(|h| h.segment), Some(2));
        Ok(())
    }
}
