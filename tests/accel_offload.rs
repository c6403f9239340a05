//! Offloaded factorization against the host path.
//!
//! The accelerator mirror runs the same dense kernels over arena-backed lane
//! scratch, so an offloaded factorization must reproduce the host factors
//! exactly; an undersized device budget must be rejected up front.

use faer::Mat;
use sparlu::parallel::{ProcessGrid, SerialComm};
use sparlu::{CscMatrix, FactorOptions, LuEngine, SluError, SupernodePartition, distribute_panels};

fn dense_test_matrix(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        if i == j { 25.0 } else { ((i * 11 + j * 5) % 9) as f64 - 4.0 }
    })
}

fn serial_engine(a: &Mat<f64>, block: usize, opts: FactorOptions) -> LuEngine<SerialComm> {
    let csc = CscMatrix::from_dense(a);
    let part = SupernodePartition::uniform(a.nrows(), block);
    let grid = ProcessGrid::serial();
    let (l, u) = distribute_panels(&csc, &part, &grid).unwrap();
    LuEngine::new(grid, part, l, u, opts).unwrap()
}

#[test]
fn offload_reproduces_host_factors() {
    let a = dense_test_matrix(8);

    let mut host = serial_engine(&a, 2, FactorOptions::default());
    host.factor().unwrap();

    let opts = FactorOptions {
        accel_offload: true,
        ..Default::default()
    };
    let mut dev = serial_engine(&a, 2, opts);
    dev.setup_accel(64 << 20).unwrap();
    dev.factor().unwrap();
    assert_eq!(dev.status(), 0);

    for k in 0..host.n_supernodes() {
        assert_eq!(host.l_panel(k).vals(), dev.l_panel(k).vals());
        assert_eq!(host.u_panel(k).vals(), dev.u_panel(k).vals());
        assert_eq!(host.perm(k), dev.perm(k));
    }
}

#[test]
fn undersized_device_budget_is_fatal() {
    let a = dense_test_matrix(8);
    let opts = FactorOptions {
        accel_offload: true,
        ..Default::default()
    };
    let mut engine = serial_engine(&a, 2, opts);
    match engine.setup_accel(1024) {
        Err(SluError::DeviceMemory {
            required,
            available,
        }) => {
            assert!(required > available);
        }
        other => panic!("expected device memory error, got {other:?}"),
    }
}
