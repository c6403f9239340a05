//! End-to-end factorization tests on the single-process grid.
//!
//! These drive the full pipeline (distribution, diagonal factorization,
//! panel solves, look-ahead and Schur updates) and check the factors by
//! solving linear systems against known solutions.

use approx::assert_abs_diff_eq;
use faer::Mat;
use rand::Rng;
use sparlu::parallel::{ProcessGrid, SerialComm};
use sparlu::{CscMatrix, FactorOptions, LuEngine, SluError, SupernodePartition, distribute_panels};

/// Diagonally dominant matrix with a block-tridiagonal pattern at 2x2
/// supernode granularity.
fn block_tridiagonal(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        let (bi, bj) = (i / 2, j / 2);
        if bi.abs_diff(bj) > 1 {
            0.0
        } else if i == j {
            12.0
        } else {
            0.5 + ((i * 7 + j * 3) % 5) as f64 * 0.3
        }
    })
}

fn serial_engine(a: &Mat<f64>, block: usize, opts: FactorOptions) -> LuEngine<SerialComm> {
    let csc = CscMatrix::from_dense(a);
    let part = SupernodePartition::uniform(a.nrows(), block);
    let grid = ProcessGrid::serial();
    let (l, u) = distribute_panels(&csc, &part, &grid).unwrap();
    LuEngine::new(grid, part, l, u, opts).unwrap()
}

/// Solve `A x = b` from the factored panels: segment-wise permuted forward
/// substitution through the column panels, then backward substitution
/// through the row panels and the diagonal blocks.
fn solve_with_factors(engine: &LuEngine<SerialComm>, b: &[f64]) -> Vec<f64> {
    let part = engine.partition();
    let ns = engine.n_supernodes();
    let mut y = b.to_vec();

    for k in 0..ns {
        let first = part.first_col(k);
        let sz = part.size(k);
        let perm = engine.perm(k);
        let mut seg: Vec<f64> = (0..sz).map(|i| y[first + perm[i]]).collect();
        let lp = engine.l_panel(k);
        for j in 0..sz {
            for i in j + 1..sz {
                seg[i] -= lp.value(i, j) * seg[j];
            }
        }
        y[first..first + sz].copy_from_slice(&seg);
        for slot in 0..lp.nblocks() {
            if lp.global_id(slot) == k {
                continue;
            }
            let off = lp.block_offset(slot);
            for (ri, &grow) in lp.row_list(slot).iter().enumerate() {
                let mut s = 0.0;
                for j in 0..sz {
                    s += lp.value(off + ri, j) * seg[j];
                }
                y[grow] -= s;
            }
        }
    }

    for k in (0..ns).rev() {
        let first = part.first_col(k);
        let sz = part.size(k);
        let up = engine.u_panel(k);
        let lp = engine.l_panel(k);
        let mut seg: Vec<f64> = y[first..first + sz].to_vec();
        for slot in 0..up.nblocks() {
            let cbase = up.block_offset(slot) / up.lda();
            for (ci, &gcol) in up.col_list(slot).iter().enumerate() {
                let xj = y[gcol];
                for (i, s) in seg.iter_mut().enumerate() {
                    *s -= up.value(i, cbase + ci) * xj;
                }
            }
        }
        for j in (0..sz).rev() {
            seg[j] /= lp.value(j, j);
            for i in 0..j {
                seg[i] -= lp.value(i, j) * seg[j];
            }
        }
        y[first..first + sz].copy_from_slice(&seg);
    }
    y
}

#[test]
fn factor_and_solve_block_tridiagonal() {
    let n = 6;
    let a = block_tridiagonal(n);
    let mut engine = serial_engine(&a, 2, FactorOptions::default());
    engine.factor().unwrap();
    assert_eq!(engine.status(), 0);

    // diagonal dominance keeps every pivot on the diagonal
    for k in 0..engine.n_supernodes() {
        assert_eq!(engine.perm(k), &[0, 1]);
    }

    let x_true: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    let b: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| a[(i, j)] * x_true[j]).sum())
        .collect();
    let x = solve_with_factors(&engine, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_true[i], epsilon = 1e-10);
    }
}

#[test]
fn factor_and_solve_random_dense() {
    let n = 12;
    let mut rng = rand::thread_rng();
    let vals: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() - 0.5).collect();
    // large diagonal keeps the matrix well conditioned
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j { n as f64 } else { vals[j * n + i] }
    });
    let mut engine = serial_engine(&a, 3, FactorOptions::default());
    engine.factor().unwrap();
    assert_eq!(engine.status(), 0);

    let x_true: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
    let b: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| a[(i, j)] * x_true[j]).sum())
        .collect();
    let x = solve_with_factors(&engine, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_true[i], epsilon = 1e-9);
    }
}

#[test]
fn factor_and_solve_block_diagonal() {
    // decoupled diagonal blocks: every off-diagonal panel is empty, so the
    // panel broadcasts and Schur updates are all skipped
    let n = 6;
    let a = Mat::from_fn(n, n, |i, j| {
        if i / 2 == j / 2 {
            if i == j { 8.0 } else { 2.0 + (i + j) as f64 * 0.25 }
        } else {
            0.0
        }
    });
    let mut engine = serial_engine(&a, 2, FactorOptions::default());
    for k in 0..engine.n_supernodes() {
        assert!(engine.u_panel(k).is_empty());
        assert_eq!(engine.uidx_send_count(k), 0);
    }
    engine.factor().unwrap();
    assert_eq!(engine.status(), 0);

    let x_true = vec![2.0, -1.0, 0.5, 3.0, -2.0, 1.0];
    let b: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| a[(i, j)] * x_true[j]).sum())
        .collect();
    let x = solve_with_factors(&engine, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_true[i], epsilon = 1e-10);
    }
}

#[test]
fn factor_and_solve_with_block_fill_in() {
    // pattern blocks (2,0) and (0,1) combine during elimination into an
    // update at block (2,1), absent from the input pattern
    let n = 6;
    let a = Mat::from_fn(n, n, |i, j| {
        let (bi, bj) = (i / 2, j / 2);
        if i == j {
            12.0
        } else if bi == bj || (bi == 2 && bj == 0) || (bi == 0 && bj == 1) {
            0.3 + ((i * 3 + j) % 4) as f64 * 0.2
        } else {
            0.0
        }
    });
    let mut engine = serial_engine(&a, 2, FactorOptions::default());
    // the fill block must be allocated up front
    assert!(engine.l_panel(1).find(2).is_some());
    engine.factor().unwrap();
    assert_eq!(engine.status(), 0);

    let x_true = vec![1.0, -2.0, 3.0, -1.0, 2.0, 0.5];
    let b: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| a[(i, j)] * x_true[j]).sum())
        .collect();
    let x = solve_with_factors(&engine, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_true[i], epsilon = 1e-10);
    }
}

#[test]
fn factor_with_pivoting_single_supernode() {
    // zero leading diagonal entry forces a row interchange
    let a = Mat::from_fn(3, 3, |i, j| {
        [[0.0, 2.0, 1.0], [4.0, 1.0, 3.0], [2.0, 5.0, 1.0]][i][j]
    });
    let mut engine = serial_engine(&a, 3, FactorOptions::default());
    engine.factor().unwrap();
    assert_ne!(engine.perm(0), &[0, 1, 2]);

    let b = vec![7.0, 15.0, 15.0];
    let x = solve_with_factors(&engine, &b);
    for (i, want) in [1.0, 2.0, 3.0].iter().enumerate() {
        assert_abs_diff_eq!(x[i], *want, epsilon = 1e-10);
    }
}

#[test]
fn send_counts_match_local_panel_sizes() {
    let a = block_tridiagonal(8);
    let engine = serial_engine(&a, 2, FactorOptions::default());
    let (mut mlv, mut muv, mut mli, mut mui) = (0, 0, 0, 0);
    for k in 0..engine.n_supernodes() {
        assert_eq!(engine.lval_send_count(k), engine.l_panel(k).nzval_len());
        assert_eq!(engine.lidx_send_count(k), engine.l_panel(k).index_len());
        assert_eq!(engine.uval_send_count(k), engine.u_panel(k).nzval_len());
        assert_eq!(engine.uidx_send_count(k), engine.u_panel(k).index_len());
        mlv = mlv.max(engine.lval_send_count(k));
        muv = muv.max(engine.uval_send_count(k));
        mli = mli.max(engine.lidx_send_count(k));
        mui = mui.max(engine.uidx_send_count(k));
    }
    assert_eq!(engine.max_counts(), (mlv, muv, mli, mui));
}

#[test]
fn look_ahead_and_exclude_one_cover_full_update() {
    // one full Schur update versus the look-ahead pass plus the exclude-one
    // pass must touch every trailing block exactly once, bit for bit
    let n = 6;
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j { 20.0 } else { ((i * 5 + j * 3) % 7) as f64 - 3.0 }
    });
    let mut full = serial_engine(&a, 2, FactorOptions::default());
    let mut split = serial_engine(&a, 2, FactorOptions::default());

    full.diag_factor_and_panel_solve(0, 0).unwrap();
    split.diag_factor_and_panel_solve(0, 0).unwrap();

    let (kl, ku) = (full.l_panel(0).clone(), full.u_panel(0).clone());
    full.schur_update(0, &kl, &ku).unwrap();

    let (kl, ku) = (split.l_panel(0).clone(), split.u_panel(0).clone());
    split.look_ahead_update(0, 1, &kl, &ku).unwrap();
    split.schur_update_exclude_one(0, 1, &kl, &ku).unwrap();

    for k in 0..full.n_supernodes() {
        assert_eq!(full.l_panel(k).vals(), split.l_panel(k).vals());
        assert_eq!(full.u_panel(k).vals(), split.u_panel(k).vals());
    }
}

#[test]
fn zero_column_reports_singular_supernode() {
    // supernode 1 carries an exactly zero diagonal block
    let n = 4;
    let a = Mat::from_fn(n, n, |i, j| {
        if j < 2 && i < 2 {
            if i == j { 5.0 } else { 1.0 }
        } else {
            0.0
        }
    });
    let mut engine = serial_engine(&a, 2, FactorOptions::default());
    match engine.factor() {
        Err(SluError::SingularPivot { supernode }) => assert_eq!(supernode, 1),
        other => panic!("expected singular pivot, got {other:?}"),
    }
    assert_eq!(engine.status(), -2);
}
