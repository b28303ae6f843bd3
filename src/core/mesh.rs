//! Structured mesh interface and the uniform rectilinear implementation.
//!
//! Logical coordinates run from `0` to `n - 1` along each axis, so node `(i, j)` sits at
//! logical `(i, j)` and a particle with logical coordinate `lc` lives in cell
//! `(floor(lc[0]), floor(lc[1]))`.

use std::f64::consts::PI;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::core::domain::DomainType;
use crate::core::geometry::{Geometry, Segment, SegmentId};
use crate::error::{Error, Result};

/// Index of a mesh inside its [`Domain`](crate::core::domain::Domain).
pub type MeshId = usize;

/// Mesh faces, in the order exit fractions are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Right,
    Top,
    Left,
    Bottom,
}

impl Face {
    pub const ALL: [Face; 4] = [Face::Right, Face::Top, Face::Left, Face::Bottom];

    /// Logical axis the face is perpendicular to.
    #[inline]
    pub fn axis(self) -> usize {
        match self {
            Face::Right | Face::Left => 0,
            Face::Top | Face::Bottom => 1,
        }
    }

    /// Axis running along the face.
    #[inline]
    pub fn tangent_axis(self) -> usize {
        1 - self.axis()
    }

    #[inline]
    fn slot(self) -> usize {
        match self {
            Face::Right => 0,
            Face::Top => 1,
            Face::Left => 2,
            Face::Bottom => 3,
        }
    }
}

/// Node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Particles leaving through the node are removed.
    #[default]
    Open,
    /// Mirror plane.
    Symmetry,
    /// Wraps to the opposite face.
    Periodic,
    /// Shared with one or more neighbouring meshes.
    Mesh,
    /// Solid surface; segments of such boundaries take part in surface interaction.
    Dirichlet,
    /// Interior or unclassified.
    Internal,
}

/// Coordinate mapping, node classification and topology of one structured mesh.
pub trait Mesh: Debug + Send + Sync {
    fn id(&self) -> MeshId;

    /// Number of nodes along the first logical axis.
    fn ni(&self) -> usize;

    /// Number of nodes along the second logical axis.
    fn nj(&self) -> usize;

    fn to_logical(&self, pos: [f64; 2]) -> [f64; 2];

    fn to_physical(&self, lc: [f64; 2]) -> [f64; 2];

    /// Physical bounding box as (lower-left, upper-right).
    fn bounds(&self) -> ([f64; 2], [f64; 2]);

    fn contains_pos(&self, pos: [f64; 2]) -> bool;

    fn node_type(&self, i: usize, j: usize) -> NodeType;

    /// Classification used when a particle leaves through `face` at node `index` along it.
    ///
    /// Defaults to the type of the face node; meshes that keep per-face types override this
    /// so corner nodes resolve according to the face actually crossed.
    fn exit_type(&self, face: Face, index: usize) -> NodeType {
        let (i, j) = face_node(self.ni(), self.nj(), face, index);
        self.node_type(i, j)
    }

    /// Meshes registered across `face` at node `index` along it.
    fn neighbors(&self, face: Face, index: usize) -> &[MeshId];

    /// Boundary segments registered on node `(i, j)`.
    fn segments_at(&self, i: usize, j: usize) -> &[SegmentId];

    /// Unit normal of `face` at physical position `pos`.
    fn boundary_normal(&self, face: Face, pos: [f64; 2]) -> [f64; 2];

    /// Control volume of node `(i, j)`.
    fn node_volume(&self, i: usize, j: usize) -> f64;
}

/// Node coordinates of the `index`-th node along `face`.
#[inline]
pub fn face_node(ni: usize, nj: usize, face: Face, index: usize) -> (usize, usize) {
    match face {
        Face::Right => (ni - 1, index.min(nj - 1)),
        Face::Left => (0, index.min(nj - 1)),
        Face::Top => (index.min(ni - 1), nj - 1),
        Face::Bottom => (index.min(ni - 1), 0),
    }
}

/// Uniform rectilinear mesh spanning `[x0, xd]` with `ni × nj` nodes.
#[derive(Debug, Clone)]
pub struct UniformMesh {
    id: MeshId,
    x0: [f64; 2],
    xd: [f64; 2],
    dh: [f64; 2],
    ni: usize,
    nj: usize,
    domain_type: DomainType,
    node_types: Vec<NodeType>,
    /// Per face, per node along it.
    face_types: [Vec<NodeType>; 4],
    face_neighbors: [Vec<Vec<MeshId>>; 4],
    node_segments: Vec<Vec<SegmentId>>,
}

impl UniformMesh {
    /// Create a mesh with open faces.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if fewer than two nodes are requested on an axis.
    /// - `Error::MathError` if the extent is empty or non-finite.
    pub fn new(id: MeshId, x0: [f64; 2], xd: [f64; 2], ni: usize, nj: usize) -> Result<Self> {
        if ni < 2 || nj < 2 {
            return Err(Error::InvalidParam(
                "a mesh needs at least 2 nodes per axis".into(),
            ));
        }
        if !x0.iter().chain(xd.iter()).all(|x| x.is_finite()) || xd[0] <= x0[0] || xd[1] <= x0[1]
        {
            return Err(Error::MathError(format!(
                "degenerate mesh extent {x0:?} -> {xd:?}"
            )));
        }
        let dh = [
            (xd[0] - x0[0]) / (ni - 1) as f64,
            (xd[1] - x0[1]) / (nj - 1) as f64,
        ];
        let mut node_types = vec![NodeType::Internal; ni * nj];
        for i in 0..ni {
            node_types[i * nj] = NodeType::Open;
            node_types[i * nj + nj - 1] = NodeType::Open;
        }
        for j in 0..nj {
            node_types[j] = NodeType::Open;
            node_types[(ni - 1) * nj + j] = NodeType::Open;
        }
        Ok(Self {
            id,
            x0,
            xd,
            dh,
            ni,
            nj,
            domain_type: DomainType::XY,
            node_types,
            face_types: [
                vec![NodeType::Open; nj],
                vec![NodeType::Open; ni],
                vec![NodeType::Open; nj],
                vec![NodeType::Open; ni],
            ],
            face_neighbors: [
                vec![Vec::new(); nj],
                vec![Vec::new(); ni],
                vec![Vec::new(); nj],
                vec![Vec::new(); ni],
            ],
            node_segments: vec![Vec::new(); ni * nj],
        })
    }

    /// Use axisymmetric control volumes for `domain_type`.
    pub fn with_domain_type(mut self, domain_type: DomainType) -> Self {
        self.domain_type = domain_type;
        self
    }

    /// Classify every node of `face`.
    pub fn set_face(&mut self, face: Face, node_type: NodeType) {
        let len = self.face_types[face.slot()].len();
        for index in 0..len {
            self.face_types[face.slot()][index] = node_type;
            let (i, j) = face_node(self.ni, self.nj, face, index);
            self.node_types[i * self.nj + j] = node_type;
        }
    }

    /// Classify `face` as an inter-mesh boundary and register `neighbor` on all of its nodes.
    pub fn link_neighbor(&mut self, face: Face, neighbor: MeshId) {
        self.set_face(face, NodeType::Mesh);
        for list in self.face_neighbors[face.slot()].iter_mut() {
            if !list.contains(&neighbor) {
                list.push(neighbor);
            }
        }
    }

    /// Override the classification of a single node.
    ///
    /// Errors:
    /// - `Error::OutOfBounds` if `(i, j)` is not a node of this mesh.
    pub fn set_node_type(&mut self, i: usize, j: usize, node_type: NodeType) -> Result<()> {
        if i >= self.ni || j >= self.nj {
            return Err(Error::OutOfBounds(format!(
                "node ({i}, {j}) outside {}x{} mesh",
                self.ni, self.nj
            )));
        }
        self.node_types[i * self.nj + j] = node_type;
        if i == 0 {
            self.face_types[Face::Left.slot()][j] = node_type;
        }
        if i == self.ni - 1 {
            self.face_types[Face::Right.slot()][j] = node_type;
        }
        if j == 0 {
            self.face_types[Face::Bottom.slot()][i] = node_type;
        }
        if j == self.nj - 1 {
            self.face_types[Face::Top.slot()][i] = node_type;
        }
        Ok(())
    }

    /// Index `segment` on every node whose cell overlaps the segment's logical bounding box.
    ///
    /// Segments entirely outside the mesh are ignored.
    pub fn register_segment(&mut self, segment: &Segment) {
        let a = self.to_logical(segment.x1);
        let b = self.to_logical(segment.x2);
        let max_i = (self.ni - 1) as f64;
        let max_j = (self.nj - 1) as f64;
        let lo = [a[0].min(b[0]), a[1].min(b[1])];
        let hi = [a[0].max(b[0]), a[1].max(b[1])];
        if hi[0] < 0.0 || hi[1] < 0.0 || lo[0] > max_i || lo[1] > max_j {
            return;
        }
        let i_min = lo[0].clamp(0.0, max_i).floor() as usize;
        let i_max = hi[0].clamp(0.0, max_i).floor() as usize;
        let j_min = lo[1].clamp(0.0, max_j).floor() as usize;
        let j_max = hi[1].clamp(0.0, max_j).floor() as usize;
        for i in i_min..=i_max {
            for j in j_min..=j_max {
                let list = &mut self.node_segments[i * self.nj + j];
                if !list.contains(&segment.id) {
                    list.push(segment.id);
                }
            }
        }
    }

    /// Register every segment of `geometry` (see [`register_segment`](Self::register_segment)).
    pub fn register_geometry(&mut self, geometry: &Geometry) {
        for segment in geometry.segments() {
            self.register_segment(segment);
        }
    }

    /// Physical extent of the node control interval `[x - dh/2, x + dh/2]`, clipped to the mesh.
    #[inline]
    fn node_span(&self, axis: usize, index: usize) -> (f64, f64) {
        let x = self.x0[axis] + index as f64 * self.dh[axis];
        let lo = (x - 0.5 * self.dh[axis]).max(self.x0[axis]);
        let hi = (x + 0.5 * self.dh[axis]).min(self.xd[axis]);
        (lo, hi)
    }
}

impl Mesh for UniformMesh {
    fn id(&self) -> MeshId {
        self.id
    }

    fn ni(&self) -> usize {
        self.ni
    }

    fn nj(&self) -> usize {
        self.nj
    }

    #[inline]
    fn to_logical(&self, pos: [f64; 2]) -> [f64; 2] {
        [
            (pos[0] - self.x0[0]) / self.dh[0],
            (pos[1] - self.x0[1]) / self.dh[1],
        ]
    }

    #[inline]
    fn to_physical(&self, lc: [f64; 2]) -> [f64; 2] {
        let n = [self.ni, self.nj];
        let mut pos = [0.0; 2];
        for axis in 0..2 {
            // The last node sits exactly on the upper edge.
            pos[axis] = if lc[axis] == (n[axis] - 1) as f64 {
                self.xd[axis]
            } else {
                self.x0[axis] + lc[axis] * self.dh[axis]
            };
        }
        pos
    }

    fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        (self.x0, self.xd)
    }

    fn contains_pos(&self, pos: [f64; 2]) -> bool {
        pos[0] >= self.x0[0] && pos[0] <= self.xd[0] && pos[1] >= self.x0[1] && pos[1] <= self.xd[1]
    }

    fn node_type(&self, i: usize, j: usize) -> NodeType {
        self.node_types
            .get(i * self.nj + j)
            .copied()
            .unwrap_or(NodeType::Internal)
    }

    fn exit_type(&self, face: Face, index: usize) -> NodeType {
        let types = &self.face_types[face.slot()];
        types[index.min(types.len() - 1)]
    }

    fn neighbors(&self, face: Face, index: usize) -> &[MeshId] {
        let lists = &self.face_neighbors[face.slot()];
        &lists[index.min(lists.len() - 1)]
    }

    fn segments_at(&self, i: usize, j: usize) -> &[SegmentId] {
        self.node_segments
            .get(i * self.nj + j)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn boundary_normal(&self, face: Face, _pos: [f64; 2]) -> [f64; 2] {
        match face {
            Face::Right => [1.0, 0.0],
            Face::Left => [-1.0, 0.0],
            Face::Top => [0.0, 1.0],
            Face::Bottom => [0.0, -1.0],
        }
    }

    fn node_volume(&self, i: usize, j: usize) -> f64 {
        let (a0, a1) = self.node_span(0, i);
        let (b0, b1) = self.node_span(1, j);
        match self.domain_type {
            DomainType::XY => (a1 - a0) * (b1 - b0),
            DomainType::RZ => PI * (a1 * a1 - a0 * a0) * (b1 - b0),
            DomainType::ZR => (a1 - a0) * PI * (b1 * b1 - b0 * b0),
        }
    }
}
