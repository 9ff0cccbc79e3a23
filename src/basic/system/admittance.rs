use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use super::elements::{Line, Shunt, Transformer};

/// The two terminal buses of a branch, `[from, to]`.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port2(pub [usize; 2]);

impl Port2 {
    pub fn from_bus(&self) -> usize {
        self.0[0]
    }
    pub fn to_bus(&self) -> usize {
        self.0[1]
    }
}

/// Two-port pi-model of a branch:
///
/// ```text
/// | If |   | Yff  Yft |   | Vf |
/// |    | = |          | * |    |
/// | It |   | Ytf  Ytt |   | Vt |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchAdmittance {
    pub port: Port2,
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

impl BranchAdmittance {
    /// Series admittance `1/(r + jx)` with half of `h` at each end.
    pub fn line(line: &Line) -> Self {
        let ys = Complex64::one() / Complex64::new(line.r_pu, line.x_pu);
        let half = 0.5 * line.h_pu;
        Self {
            port: Port2([line.from_bus, line.to_bus]),
            yff: ys + half,
            yft: -ys,
            ytf: -ys,
            ytt: ys + half,
        }
    }

    /// Same as a line, with the off-nominal ratio on the high-voltage side.
    pub fn transformer(trafo: &Transformer) -> Self {
        let ys = Complex64::one() / Complex64::new(trafo.r_pu, trafo.x_pu);
        let half = 0.5 * trafo.h_pu;
        let tau = trafo.ratio();
        Self {
            port: Port2([trafo.hv_bus, trafo.lv_bus]),
            yff: (ys + half) / (tau * tau),
            yft: -ys / tau,
            ytf: -ys / tau,
            ytt: ys + half,
        }
    }

    /// Currents injected into the branch at the from and to terminals.
    #[inline]
    pub fn currents(&self, v_from: Complex64, v_to: Complex64) -> (Complex64, Complex64) {
        (
            self.yff * v_from + self.yft * v_to,
            self.ytf * v_from + self.ytt * v_to,
        )
    }

    pub(crate) fn stamp(&self, y_bus: &mut CooMatrix<Complex64>) {
        let (f, t) = (self.port.from_bus(), self.port.to_bus());
        y_bus.push(f, f, self.yff);
        y_bus.push(f, t, self.yft);
        y_bus.push(t, f, self.ytf);
        y_bus.push(t, t, self.ytt);
    }
}

/// Creates the nodal admittance matrix from in-service branches and shunts.
///
/// Every bus receives an explicit diagonal entry, so the sparsity pattern only
/// depends on which branches are in service.
pub(crate) fn create_y_bus(
    nodes: usize,
    sn_mva: f64,
    lines: &[Line],
    trafos: &[Transformer],
    shunts: &[Shunt],
) -> CscMatrix<Complex64> {
    let mut y_bus = CooMatrix::new(nodes, nodes);
    for i in 0..nodes {
        y_bus.push(i, i, Complex64::zero());
    }
    lines
        .iter()
        .filter(|l| l.in_service)
        .for_each(|l| BranchAdmittance::line(l).stamp(&mut y_bus));
    trafos
        .iter()
        .filter(|t| t.in_service)
        .for_each(|t| BranchAdmittance::transformer(t).stamp(&mut y_bus));
    for shunt in shunts.iter().filter(|s| s.in_service) {
        y_bus.push(shunt.bus, shunt.bus, shunt.admittance_pu(sn_mva));
    }
    CscMatrix::from(&y_bus)
}
