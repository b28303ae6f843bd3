//! Node-centred scalar fields with bilinear scatter / gather, and the field lookup the push
//! samples electromagnetic fields through.

use crate::core::integrator::FieldSample;
use crate::core::mesh::{Mesh, MeshId};
use crate::error::{Error, Result};

/// Scalar field stored on the `ni × nj` nodes of one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Field2D {
    ni: usize,
    nj: usize,
    data: Vec<f64>,
}

impl Field2D {
    /// Zero-initialised field.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if fewer than two nodes are requested on an axis.
    pub fn new(ni: usize, nj: usize) -> Result<Self> {
        if ni < 2 || nj < 2 {
            return Err(Error::InvalidParam(
                "a field needs at least 2 nodes per axis".into(),
            ));
        }
        Ok(Self {
            ni,
            nj,
            data: vec![0.0; ni * nj],
        })
    }

    /// Zero field shaped like `mesh`.
    pub fn for_mesh(mesh: &dyn Mesh) -> Self {
        Self {
            ni: mesh.ni(),
            nj: mesh.nj(),
            data: vec![0.0; mesh.ni() * mesh.nj()],
        }
    }

    /// Field with the same value on every node.
    pub fn filled(ni: usize, nj: usize, value: f64) -> Result<Self> {
        let mut f = Self::new(ni, nj)?;
        f.data.fill(value);
        Ok(f)
    }

    pub fn ni(&self) -> usize {
        self.ni
    }

    pub fn nj(&self) -> usize {
        self.nj
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.nj + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.nj + j] = value;
    }

    /// Row-major node values (`i` outer, `j` inner).
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Cell index and fractional offsets for `lc`, clamped so that points on the upper faces
    /// fall into the last cell.
    #[inline]
    fn locate(&self, lc: [f64; 2]) -> (usize, usize, f64, f64) {
        let max_i = (self.ni - 1) as f64;
        let max_j = (self.nj - 1) as f64;
        let x = lc[0].clamp(0.0, max_i);
        let y = lc[1].clamp(0.0, max_j);
        let i = (x.floor() as usize).min(self.ni - 2);
        let j = (y.floor() as usize).min(self.nj - 2);
        (i, j, x - i as f64, y - j as f64)
    }

    /// Distribute `value` onto the four nodes surrounding `lc` with bilinear weights.
    #[inline]
    pub fn scatter(&mut self, lc: [f64; 2], value: f64) {
        let (i, j, di, dj) = self.locate(lc);
        let nj = self.nj;
        self.data[i * nj + j] += value * (1.0 - di) * (1.0 - dj);
        self.data[(i + 1) * nj + j] += value * di * (1.0 - dj);
        self.data[(i + 1) * nj + j + 1] += value * di * dj;
        self.data[i * nj + j + 1] += value * (1.0 - di) * dj;
    }

    /// Bilinear interpolation at `lc`.
    #[inline]
    pub fn gather(&self, lc: [f64; 2]) -> f64 {
        let (i, j, di, dj) = self.locate(lc);
        let nj = self.nj;
        self.data[i * nj + j] * (1.0 - di) * (1.0 - dj)
            + self.data[(i + 1) * nj + j] * di * (1.0 - dj)
            + self.data[(i + 1) * nj + j + 1] * di * dj
            + self.data[i * nj + j + 1] * (1.0 - di) * dj
    }

    /// Node-wise `self /= other`; nodes where `other` is zero become zero.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if the shapes differ.
    pub fn divide_by(&mut self, other: &Field2D) -> Result<()> {
        self.check_shape(other)?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = if b != 0.0 { *a / b } else { 0.0 };
        }
        Ok(())
    }

    /// Turn an accumulated extensive quantity into a density by dividing each node by its
    /// control volume.
    pub fn scale_by_volume(&mut self, mesh: &dyn Mesh) {
        for i in 0..self.ni {
            for j in 0..self.nj {
                let vol = mesh.node_volume(i, j);
                let v = &mut self.data[i * self.nj + j];
                *v = if vol > 0.0 { *v / vol } else { 0.0 };
            }
        }
    }

    /// Node-wise `self += other`, used to reduce per-worker buffers.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if the shapes differ.
    pub fn add_assign(&mut self, other: &Field2D) -> Result<()> {
        self.check_shape(other)?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    fn check_shape(&self, other: &Field2D) -> Result<()> {
        if self.ni != other.ni || self.nj != other.nj {
            return Err(Error::InvalidParam(format!(
                "field shape mismatch: {}x{} vs {}x{}",
                self.ni, self.nj, other.ni, other.nj
            )));
        }
        Ok(())
    }
}

/// Source of electromagnetic field samples for the push.
pub trait FieldLookup: Sync {
    fn sample(&self, mesh: MeshId, lc: [f64; 2]) -> FieldSample;
}

/// Spatially constant field, identical on every mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformField(pub FieldSample);

impl UniformField {
    /// No electric or magnetic field.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl FieldLookup for UniformField {
    #[inline]
    fn sample(&self, _mesh: MeshId, _lc: [f64; 2]) -> FieldSample {
        self.0
    }
}

/// In-plane electric and magnetic node fields of one mesh, as produced by a field solver.
#[derive(Debug, Clone)]
pub struct EmFields {
    pub efi: Field2D,
    pub efj: Field2D,
    pub bfi: Field2D,
    pub bfj: Field2D,
}

impl EmFields {
    /// All-zero fields shaped like `mesh`.
    pub fn zeros(mesh: &dyn Mesh) -> Self {
        Self {
            efi: Field2D::for_mesh(mesh),
            efj: Field2D::for_mesh(mesh),
            bfi: Field2D::for_mesh(mesh),
            bfj: Field2D::for_mesh(mesh),
        }
    }

    #[inline]
    pub fn gather(&self, lc: [f64; 2]) -> FieldSample {
        FieldSample {
            e: [self.efi.gather(lc), self.efj.gather(lc), 0.0],
            b: [self.bfi.gather(lc), self.bfj.gather(lc), 0.0],
        }
    }
}

/// Per-mesh fields indexed by mesh id; meshes without an entry see no field.
impl FieldLookup for [EmFields] {
    #[inline]
    fn sample(&self, mesh: MeshId, lc: [f64; 2]) -> FieldSample {
        self.get(mesh).map(|f| f.gather(lc)).unwrap_or_default()
    }
}

impl FieldLookup for Vec<EmFields> {
    #[inline]
    fn sample(&self, mesh: MeshId, lc: [f64; 2]) -> FieldSample {
        self.as_slice().sample(mesh, lc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::UniformMesh;
    use approx::assert_relative_eq;

    #[test]
    fn scatter_conserves_total() -> Result<()> {
        let mut f = Field2D::new(4, 4)?;
        f.scatter([1.25, 2.5], 3.0);
        f.scatter([0.0, 0.0], 1.0);
        assert_relative_eq!(f.sum(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(f.get(1, 2), 3.0 * 0.75 * 0.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn upper_face_points_land_on_last_nodes() -> Result<()> {
        let mut f = Field2D::new(3, 3)?;
        f.scatter([2.0, 2.0], 1.0);
        assert_relative_eq!(f.get(2, 2), 1.0);
        assert_relative_eq!(f.gather([2.0, 2.0]), 1.0);
        Ok(())
    }

    #[test]
    fn gather_interpolates_linear_fields_exactly() -> Result<()> {
        let mut f = Field2D::new(5, 5)?;
        for i in 0..5 {
            for j in 0..5 {
                f.set(i, j, 2.0 * i as f64 - j as f64);
            }
        }
        assert_relative_eq!(f.gather([1.5, 2.25]), 3.0 - 2.25, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn divide_skips_empty_nodes() -> Result<()> {
        let mut a = Field2D::filled(2, 2, 6.0)?;
        let mut b = Field2D::new(2, 2)?;
        b.set(0, 0, 3.0);
        a.divide_by(&b)?;
        assert_eq!(a.get(0, 0), 2.0);
        assert_eq!(a.get(1, 1), 0.0);
        assert!(a.divide_by(&Field2D::new(3, 2)?).is_err());
        Ok(())
    }

    #[test]
    fn volume_scaling_uses_control_volumes() -> Result<()> {
        let mesh = UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 3, 3)?;
        let mut f = Field2D::filled(3, 3, 1.0)?;
        f.scale_by_volume(&mesh);
        // Interior node has a full 0.5 x 0.5 cell, corners a quarter of it.
        assert_relative_eq!(f.get(1, 1), 4.0, epsilon = 1e-12);
        assert_relative_eq!(f.get(0, 0), 16.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn em_lookup_defaults_to_zero_for_missing_meshes() -> Result<()> {
        let mesh = UniformMesh::new(0, [0.0, 0.0], [1.0, 1.0], 3, 3)?;
        let mut em = EmFields::zeros(&mesh);
        em.efi = Field2D::filled(3, 3, 5.0)?;
        let fields = vec![em];
        assert_eq!(fields.sample(0, [1.0, 1.0]).e, [5.0, 0.0, 0.0]);
        assert_eq!(fields.sample(4, [1.0, 1.0]), FieldSample::default());
        Ok(())
    }
}
