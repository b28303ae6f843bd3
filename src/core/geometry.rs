//! Boundary geometry: straight segments grouped into named boundaries, each with
//! surface-interaction materials along its length.

use std::fmt::Debug;
use std::sync::Arc;

use crate::core::mesh::NodeType;
use crate::core::vector::{dot2, mirror2, unit2};
use crate::error::{Error, Result};

/// Global segment index inside a [`Geometry`].
pub type SegmentId = usize;

/// Index of a boundary inside a [`Geometry`].
pub type BoundaryId = usize;

/// Straight boundary segment from `x1` to `x2`.
///
/// The normal points to the right of the `x1 -> x2` direction; boundaries are expected to
/// be drawn so that it faces the gas.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    /// Owning boundary.
    pub boundary: BoundaryId,
    /// Position of this segment along its boundary (0 for the first one).
    pub index: usize,
    pub x1: [f64; 2],
    pub x2: [f64; 2],
    normal: [f64; 2],
}

impl Segment {
    /// Errors:
    /// - `Error::MathError` if the endpoints coincide or are not finite.
    pub fn new(
        id: SegmentId,
        boundary: BoundaryId,
        index: usize,
        x1: [f64; 2],
        x2: [f64; 2],
    ) -> Result<Self> {
        let tangent = unit2([x2[0] - x1[0], x2[1] - x1[1]]).ok_or_else(|| {
            Error::MathError(format!("degenerate segment {id}: {x1:?} -> {x2:?}"))
        })?;
        Ok(Self {
            id,
            boundary,
            index,
            x1,
            x2,
            normal: [tangent[1], -tangent[0]],
        })
    }

    /// Intersect with the travel segment `p_old -> p_new`.
    ///
    /// Returns `(t_surf, t_travel)`: the hit location as a fraction along this segment and as a
    /// fraction of the travel (0 = old position, 1 = new position). Parallel or disjoint
    /// segments yield `None`.
    pub fn intersect(&self, p_old: [f64; 2], p_new: [f64; 2]) -> Option<(f64, f64)> {
        let r = [self.x2[0] - self.x1[0], self.x2[1] - self.x1[1]];
        let s = [p_new[0] - p_old[0], p_new[1] - p_old[1]];
        let denom = r[0] * s[1] - r[1] * s[0];
        if denom.abs() <= f64::EPSILON * (r[0].abs() + r[1].abs()) * (s[0].abs() + s[1].abs()) {
            return None;
        }
        let q = [p_old[0] - self.x1[0], p_old[1] - self.x1[1]];
        let t_surf = (q[0] * s[1] - q[1] * s[0]) / denom;
        let t_travel = (q[0] * r[1] - q[1] * r[0]) / denom;
        if (0.0..=1.0).contains(&t_surf) && (0.0..=1.0).contains(&t_travel) {
            Some((t_surf, t_travel))
        } else {
            None
        }
    }

    /// Unit normal at `t_surf` (constant along a straight segment).
    #[inline]
    pub fn normal(&self, _t_surf: f64) -> [f64; 2] {
        self.normal
    }
}

/// Surface physics invoked when a particle strikes a boundary.
pub trait SurfaceInteraction: Debug + Send + Sync {
    /// Handle an impact at `t_surf` along `segment`. May rewrite `vel`.
    ///
    /// Returns `true` if the particle survives, `false` if the surface absorbs it.
    fn on_impact(&self, vel: &mut [f64; 3], species: usize, segment: &Segment, t_surf: f64)
        -> bool;
}

/// Absorbs every particle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Absorb;

impl SurfaceInteraction for Absorb {
    fn on_impact(&self, _vel: &mut [f64; 3], _species: usize, _segment: &Segment, _t: f64) -> bool {
        false
    }
}

/// Mirror reflection about the segment normal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecularReflect;

impl SurfaceInteraction for SpecularReflect {
    fn on_impact(&self, vel: &mut [f64; 3], _species: usize, segment: &Segment, t: f64) -> bool {
        mirror2(vel, segment.normal(t));
        true
    }
}

/// A material covering a boundary from spline parameter `start` onwards.
#[derive(Debug, Clone)]
pub struct MaterialSpan {
    pub start: f64,
    pub material: Arc<dyn SurfaceInteraction>,
}

/// Named polyline boundary.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub id: BoundaryId,
    pub name: String,
    pub node_type: NodeType,
    pub segments: Vec<SegmentId>,
    /// Sorted by `start`.
    materials: Vec<MaterialSpan>,
}

impl Boundary {
    /// Only solid (Dirichlet) boundaries take part in surface interaction.
    #[inline]
    pub fn requires_interaction(&self) -> bool {
        self.node_type == NodeType::Dirichlet
    }

    /// Material at spline parameter `t` (segment index plus fraction along that segment).
    pub fn material_at(&self, t: f64) -> Option<&dyn SurfaceInteraction> {
        self.materials
            .iter()
            .rev()
            .find(|span| span.start <= t)
            .or_else(|| self.materials.first())
            .map(|span| span.material.as_ref())
    }

    /// Number of tally nodes along the boundary (segment endpoints).
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.segments.len() + 1
    }
}

/// All boundaries of a simulation and the segments they are built from.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    segments: Vec<Segment>,
    boundaries: Vec<Boundary>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a polyline boundary through `points`.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if fewer than two points are given.
    /// - `Error::MathError` if two consecutive points coincide.
    pub fn add_boundary(
        &mut self,
        name: &str,
        node_type: NodeType,
        points: &[[f64; 2]],
    ) -> Result<BoundaryId> {
        if points.len() < 2 {
            return Err(Error::InvalidParam(format!(
                "boundary '{name}' needs at least two points"
            )));
        }
        let boundary_id = self.boundaries.len();
        let mut segment_ids = Vec::with_capacity(points.len() - 1);
        for (index, pair) in points.windows(2).enumerate() {
            let id = self.segments.len();
            self.segments
                .push(Segment::new(id, boundary_id, index, pair[0], pair[1])?);
            segment_ids.push(id);
        }
        self.boundaries.push(Boundary {
            id: boundary_id,
            name: name.to_string(),
            node_type,
            segments: segment_ids,
            materials: Vec::new(),
        });
        Ok(boundary_id)
    }

    /// Cover the whole boundary with `material`, replacing any previous spans.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for an unknown boundary.
    pub fn set_material(
        &mut self,
        boundary: BoundaryId,
        material: Arc<dyn SurfaceInteraction>,
    ) -> Result<()> {
        let b = self.boundary_mut(boundary)?;
        b.materials = vec![MaterialSpan {
            start: 0.0,
            material,
        }];
        Ok(())
    }

    /// Use `material` from spline parameter `start` onwards.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for an unknown boundary or a non-finite start.
    pub fn add_material_span(
        &mut self,
        boundary: BoundaryId,
        start: f64,
        material: Arc<dyn SurfaceInteraction>,
    ) -> Result<()> {
        if !start.is_finite() {
            return Err(Error::InvalidParam("material span start must be finite".into()));
        }
        let b = self.boundary_mut(boundary)?;
        b.materials.push(MaterialSpan { start, material });
        b.materials.sort_by(|a, c| a.start.total_cmp(&c.start));
        Ok(())
    }

    #[inline]
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    #[inline]
    pub fn boundary(&self, id: BoundaryId) -> Option<&Boundary> {
        self.boundaries.get(id)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    fn boundary_mut(&mut self, id: BoundaryId) -> Result<&mut Boundary> {
        self.boundaries
            .get_mut(id)
            .ok_or_else(|| Error::InvalidParam(format!("unknown boundary {id}")))
    }
}

/// True if a hit at the very start of the travel should be ignored because the particle is
/// already leaving the surface.
#[inline]
pub fn leaving_surface(normal: [f64; 2], vel: &[f64; 3], t_travel: f64) -> bool {
    t_travel < f32::EPSILON as f64 && dot2(&normal, vel) > 0.0
}
