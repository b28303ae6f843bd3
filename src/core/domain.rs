//! The computational domain: meshes, boundary geometry and the axisymmetry convention.

use serde::{Deserialize, Serialize};

use crate::core::geometry::Geometry;
use crate::core::mesh::{Mesh, MeshId};
use crate::error::{Error, Result};

/// How the third position component is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DomainType {
    /// Planar: the third component is a Cartesian z.
    #[default]
    XY,
    /// Axisymmetric with the radius on the first axis.
    RZ,
    /// Axisymmetric with the radius on the second axis.
    ZR,
}

/// Meshes plus the boundaries particles can strike.
#[derive(Debug)]
pub struct Domain {
    domain_type: DomainType,
    meshes: Vec<Box<dyn Mesh>>,
    geometry: Geometry,
}

impl Domain {
    pub fn new(domain_type: DomainType, geometry: Geometry) -> Self {
        Self {
            domain_type,
            meshes: Vec::new(),
            geometry,
        }
    }

    /// Append a mesh. Its id must equal its position in the domain.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `mesh.id()` is not the next free id.
    pub fn add_mesh(&mut self, mesh: Box<dyn Mesh>) -> Result<MeshId> {
        let expected = self.meshes.len();
        if mesh.id() != expected {
            return Err(Error::InvalidParam(format!(
                "mesh id {} added at position {expected}",
                mesh.id()
            )));
        }
        self.meshes.push(mesh);
        Ok(expected)
    }

    #[inline]
    pub fn domain_type(&self) -> DomainType {
        self.domain_type
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn mesh(&self, id: MeshId) -> Option<&dyn Mesh> {
        self.meshes.get(id).map(|m| m.as_ref())
    }

    pub fn meshes(&self) -> impl Iterator<Item = &dyn Mesh> {
        self.meshes.iter().map(|m| m.as_ref())
    }

    #[inline]
    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// First mesh (in id order) whose extent contains `pos`.
    pub fn locate(&self, pos: [f64; 2]) -> Option<MeshId> {
        self.meshes
            .iter()
            .position(|m| m.contains_pos(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::UniformMesh;

    #[test]
    fn locate_prefers_lowest_id() -> Result<()> {
        let mut d = Domain::new(DomainType::XY, Geometry::new());
        d.add_mesh(Box::new(UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 3, 3)?))?;
        d.add_mesh(Box::new(UniformMesh::new(1, [1.0, 0.0], [2.0, 1.0], 3, 3)?))?;
        assert_eq!(d.locate([0.5, 0.5]), Some(0));
        assert_eq!(d.locate([1.0, 0.5]), Some(0));
        assert_eq!(d.locate([1.5, 0.5]), Some(1));
        assert_eq!(d.locate([2.5, 0.5]), None);
        Ok(())
    }

    #[test]
    fn mesh_ids_must_be_sequential() -> Result<()> {
        let mut d = Domain::new(DomainType::XY, Geometry::new());
        let err = d
            .add_mesh(Box::new(UniformMesh::new(3, [0.0, 0.0], [1.0, 1.0], 3, 3)?))
            .unwrap_err();
        assert!(err.to_string().contains("mesh id 3"));
        Ok(())
    }
}
