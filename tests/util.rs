#![allow(dead_code)]
use vmesh::prelude::*;

/// Dense level-0 mesh over `[0, n)^3` with unit pitch, all zeros.
pub fn cube(n: u64) -> ScalarMesh {
    let mut mesh = ScalarMesh::new();
    let hi = n as f64;
    mesh.fill([0.0; 3], [hi; 3], [1.0; 3]).unwrap();
    mesh
}

/// Velocity mesh over `[-v, v)^3` with pitch `dv`, filled with a Maxwellian
/// of unit density and thermal speed `vth` centered at the origin.
pub fn maxwellian(v: f64, dv: f64, vth: f64) -> VelocityMesh {
    let mut mesh = VelocityMesh::new();
    mesh.fill([-v; 3], [v; 3], [dv; 3]).unwrap();
    let norm = (2.0 * std::f64::consts::PI * vth * vth).powf(-1.5);
    for key in mesh.enumerate_ids(false) {
        let c = mesh.get_center(key).unwrap();
        let r2 = c.iter().map(|x| x * x).sum::<f64>();
        let f = norm * (-r2 / (2.0 * vth * vth)).exp();
        mesh.set(key, [f, c[0] * f, c[1] * f, c[2] * f]).unwrap();
    }
    mesh
}

/// Every stored block above level 0 has its complete sibling group stored.
pub fn assert_no_partial_groups<T: Scalar, const W: usize>(mesh: &SparseBlockMesh<T, W>) {
    for key in mesh.enumerate_ids(true) {
        if key.level == 0 {
            continue;
        }
        let siblings = mesh.siblings(key).unwrap();
        let present = siblings.iter().filter(|s| mesh.contains(**s)).count();
        assert_eq!(present, CHILDREN, "partial sibling group around {key}");
    }
}

/// `Σ value · volume` of the stored leaves' primary component.
pub fn leaf_integral<T: Scalar, const W: usize>(mesh: &SparseBlockMesh<T, W>) -> f64 {
    mesh.enumerate_leaves(false)
        .into_iter()
        .map(|k| {
            let volume: f64 = mesh.get_extent(k).unwrap().iter().product();
            mesh.get(k).unwrap().primary().as_f64() * volume
        })
        .sum()
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
