use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{PushConfig, AMU, QE};
use crate::core::{
    Domain, DomainType, Face, FieldSample, Geometry, KineticSpecies, Mesh, NodeType,
    StepContext, StepReport, UniformField, UniformMesh,
};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_face(name: &str) -> PyResult<Face> {
    match name {
        "right" => Ok(Face::Right),
        "top" => Ok(Face::Top),
        "left" => Ok(Face::Left),
        "bottom" => Ok(Face::Bottom),
        other => Err(py_err(format!("unknown face '{other}'"))),
    }
}

fn parse_node_type(name: &str) -> PyResult<NodeType> {
    match name {
        "open" => Ok(NodeType::Open),
        "symmetry" => Ok(NodeType::Symmetry),
        "periodic" => Ok(NodeType::Periodic),
        other => Err(py_err(format!(
            "face type '{other}' is not available from Python (open, symmetry, periodic)"
        ))),
    }
}

fn parse_domain_type(name: &str) -> PyResult<DomainType> {
    match name {
        "xy" => Ok(DomainType::XY),
        "rz" => Ok(DomainType::RZ),
        "zr" => Ok(DomainType::ZR),
        other => Err(py_err(format!("unknown domain type '{other}'"))),
    }
}

fn to_array(rows: Vec<[f64; 3]>) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((rows.len(), 3));
    for (i, row) in rows.iter().enumerate() {
        for k in 0..3 {
            arr[[i, k]] = row[k];
        }
    }
    arr
}

/// Single-mesh, single-species particle push exposed to Python.
///
/// API:
/// - __new__(x0, xd, ni, nj, molwt, charge, spwt, dt, faces=None, domain_type="xy", num_blocks=None)
/// - set_field(e, b)
/// - add_particle(pos, vel) -> bool
/// - advance(steps=1) -> list of (counter, value) pairs summed over the steps
/// - get_positions() / get_velocities() -> np.ndarray, shape (N, 3)
/// - get_density() -> np.ndarray, shape (ni, nj)
#[pyclass]
pub struct PicCore {
    domain: Domain,
    species: KineticSpecies,
    field: UniformField,
    dt: f64,
    iteration: u64,
}

#[pymethods]
impl PicCore {
    /// Parameters
    /// - x0, xd: lower-left and upper-right mesh corners
    /// - ni, nj: node counts (>= 2)
    /// - molwt: molecular weight (amu); charge: in elementary charges; spwt: specific weight
    /// - dt: time step (s)
    /// - faces: optional list of (face, type) pairs, face in left/right/top/bottom and type in
    ///   open/symmetry/periodic
    ///
    /// Errors: raises ValueError on invalid parameters.
    #[new]
    #[pyo3(signature = (x0, xd, ni, nj, molwt, charge, spwt, dt, faces=None, domain_type="xy", num_blocks=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        x0: (f64, f64),
        xd: (f64, f64),
        ni: usize,
        nj: usize,
        molwt: f64,
        charge: f64,
        spwt: f64,
        dt: f64,
        faces: Option<Vec<(String, String)>>,
        domain_type: &str,
        num_blocks: Option<usize>,
    ) -> PyResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(py_err("dt must be finite and > 0"));
        }
        let domain_type = parse_domain_type(domain_type)?;
        let mut mesh = UniformMesh::new(0, [x0.0, x0.1], [xd.0, xd.1], ni, nj)
            .map_err(py_err)?
            .with_domain_type(domain_type);
        for (face, kind) in faces.unwrap_or_default() {
            mesh.set_face(parse_face(&face)?, parse_node_type(&kind)?);
        }
        let mut domain = Domain::new(domain_type, Geometry::new());
        domain.add_mesh(Box::new(mesh)).map_err(py_err)?;

        let mut push = PushConfig::default();
        if let Some(n) = num_blocks {
            push.num_blocks = n;
        }
        let species = KineticSpecies::new(
            "python",
            0,
            molwt * AMU,
            charge * QE,
            spwt,
            &domain,
            &push,
        )
        .map_err(py_err)?;
        Ok(Self {
            domain,
            species,
            field: UniformField::zero(),
            dt,
            iteration: 0,
        })
    }

    /// Set a uniform electric field `e` and magnetic field `b` (3 components each).
    fn set_field(&mut self, e: (f64, f64, f64), b: (f64, f64, f64)) -> PyResult<()> {
        let e = [e.0, e.1, e.2];
        let b = [b.0, b.1, b.2];
        if !e.iter().chain(b.iter()).all(|x| x.is_finite()) {
            return Err(py_err("field components must be finite"));
        }
        self.field = UniformField(FieldSample::new(e, b));
        Ok(())
    }

    /// Insert one particle; returns False if the position lies outside the mesh.
    fn add_particle(&mut self, pos: (f64, f64, f64), vel: (f64, f64, f64)) -> PyResult<bool> {
        let ctx = StepContext {
            dt: self.dt,
            iteration: self.iteration,
            fields: &self.field,
            tracer: None,
        };
        self.species
            .add_particle(&self.domain, &ctx, [pos.0, pos.1, pos.2], [vel.0, vel.1, vel.2])
            .map_err(py_err)
    }

    /// Advance `steps` time steps (releases the GIL during computation).
    #[pyo3(signature = (steps=1))]
    fn advance(&mut self, py: Python<'_>, steps: u64) -> PyResult<Vec<(String, usize)>> {
        let Self {
            domain,
            species,
            field,
            dt,
            iteration,
        } = self;
        let total = py.detach(|| {
            let mut total = StepReport::default();
            for _ in 0..steps {
                *iteration += 1;
                let ctx = StepContext {
                    dt: *dt,
                    iteration: *iteration,
                    fields: &*field,
                    tracer: None,
                };
                total.merge(&species.advance(domain, &ctx));
            }
            total
        });
        Ok(vec![
            ("moved".to_string(), total.moved),
            ("absorbed".to_string(), total.absorbed),
            ("escaped".to_string(), total.escaped),
            ("transferred".to_string(), total.transferred),
            ("lost".to_string(), total.lost),
            ("truncated".to_string(), total.truncated),
        ])
    }

    fn num_particles(&self) -> usize {
        self.species.num_particles()
    }

    /// Return positions as a NumPy array of shape (N, 3), dtype=float64.
    fn get_positions<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let rows: Vec<[f64; 3]> = self.species.iter_mesh(0).map(|p| p.pos).collect();
        Ok(to_array(rows).into_pyarray(py).to_owned().into())
    }

    /// Return velocities as a NumPy array of shape (N, 3), dtype=float64.
    fn get_velocities<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let rows: Vec<[f64; 3]> = self.species.iter_mesh(0).map(|p| p.vel).collect();
        Ok(to_array(rows).into_pyarray(py).to_owned().into())
    }

    /// Number density after the last step as a NumPy array of shape (ni, nj).
    fn get_density<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let mesh = self
            .domain
            .mesh(0)
            .ok_or_else(|| py_err("domain has no mesh"))?;
        let moments = self
            .species
            .moments(0)
            .ok_or_else(|| py_err("species has no moments for mesh 0"))?;
        let arr = Array2::from_shape_vec((mesh.ni(), mesh.nj()), moments.den.data().to_vec())
            .map_err(py_err)?;
        Ok(arr.into_pyarray(py).to_owned().into())
    }
}

/// The piccore Python module entry point.
#[pymodule]
fn piccore(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PicCore>()?;
    Ok(())
}
