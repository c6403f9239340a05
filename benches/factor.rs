use criterion::{Criterion, black_box, criterion_group, criterion_main};
use faer::Mat;
use sparlu::parallel::ProcessGrid;
use sparlu::{CscMatrix, FactorOptions, LuEngine, SupernodePartition, distribute_panels};

fn banded_matrix(n: usize, block: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        let (bi, bj) = (i / block, j / block);
        if bi.abs_diff(bj) > 1 {
            0.0
        } else if i == j {
            4.0 * block as f64
        } else {
            ((i * 13 + j * 7) % 11) as f64 * 0.1 - 0.5
        }
    })
}

fn bench_supernodal_vs_faer(c: &mut Criterion) {
    let n = 256;
    let block = 16;
    let a = banded_matrix(n, block);
    let csc = CscMatrix::from_dense(&a);

    c.bench_function("sparlu banded factor", |ben| {
        ben.iter(|| {
            let part = SupernodePartition::uniform(n, block);
            let grid = ProcessGrid::serial();
            let (l, u) = distribute_panels(black_box(&csc), &part, &grid).unwrap();
            let mut engine =
                LuEngine::new(grid, part, l, u, FactorOptions::default()).unwrap();
            engine.factor().unwrap();
        })
    });

    c.bench_function("faer dense LU", |ben| {
        ben.iter(|| {
            let _factor = faer::linalg::solvers::PartialPivLu::new(black_box(a.as_ref()));
        })
    });
}

criterion_group!(benches, bench_supernodal_vs_faer);
criterion_main!(benches);
