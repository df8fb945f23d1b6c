use molar_bilayer::prelude::*;

const CONFIG: &str = r#"
[[species]]
name = "LIP"
whole = "resname LIP"
head = "name P"
tail = "name C3"
mid = "name C1 C2"

[options]
cutoff = 1.2
"#;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Reproducible jitter in [-amp, amp)
struct Jitter(u64);

impl Jitter {
    fn next(&mut self, amp: f32) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0) * amp
    }
}

/// Lipids given by the mid position and the unit tail to head axis
fn system(lipids: &[(Pos, Vector3f)], pbox: Option<PeriodicBox>, amp: f32) -> (Topology, State) {
    let mut jit = Jitter(42);
    let mut atoms = vec![];
    let mut coords = vec![];
    for (i, (mid, axis)) in lipids.iter().enumerate() {
        let resid = i as i32 + 1;
        for name in ["P", "C1", "C2", "C3"] {
            atoms.push(Atom::new(name, "LIP", resid, 12.0));
        }
        let mid = mid + Vector3f::new(jit.next(amp), jit.next(amp), jit.next(amp));
        let up = 0.8 * axis + Vector3f::new(jit.next(amp), jit.next(amp), 0.0);
        coords.push(mid + up);
        coords.push(mid - Vector3f::new(0.05, 0.0, 0.0));
        coords.push(mid + Vector3f::new(0.05, 0.0, 0.0));
        coords.push(mid - up);
    }
    (Topology::new(atoms), State::new(coords, pbox))
}

/// Two flat square lattices with spacing 1 separated by `h` around z=5
fn bilayer(n: usize, h: f32, amp: f32) -> anyhow::Result<(Topology, State)> {
    let mut lips = vec![];
    for (z, dir) in [(5.0 + h / 2.0, 1.0), (5.0 - h / 2.0, -1.0)] {
        for ix in 0..n {
            for iy in 0..n {
                lips.push((Pos::new(ix as f32, iy as f32, z), Vector3f::z() * dir));
            }
        }
    }
    let pbox = PeriodicBox::from_extents(n as f32, n as f32, 10.0)?;
    Ok(system(&lips, Some(pbox), amp))
}

fn membrane(top: &Topology) -> anyhow::Result<Membrane> {
    Ok(Membrane::from_config(&TopologySelector::new(top), CONFIG)?)
}

#[test]
fn flat_lattice() -> anyhow::Result<()> {
    init_log();
    let (top, mut st) = bilayer(4, 2.0, 0.0)?;
    let mut memb = membrane(&top)?;
    assert_eq!(memb.num_lipids(), 32);
    memb.compute(&mut st)?;

    let leaflets = memb.leaflets().unwrap();
    assert_eq!(leaflets.members(0), (0..16usize).collect::<Vec<_>>().as_slice());
    assert_eq!(leaflets.members(1), (16..32usize).collect::<Vec<_>>().as_slice());

    for lip in memb.iter_lipids() {
        let p = lip.props();
        assert_eq!(p.coord_number, 4);
        assert!(!p.degenerate);
        assert!(p.normal.z.abs() > 0.999);
        assert!(p.tilt < 0.5);
        assert!(p.quad_fit_residual < 1e-4);
        assert!((p.area - 1.0).abs() < 1e-3);
        assert!(p.mean_curvature.abs() < 1e-3);
        assert!(p.gaussian_curvature.abs() < 1e-3);
    }
    // Normals point from tails to heads
    assert!(memb.lipid(0).unwrap().props().normal.z > 0.0);
    assert!(memb.lipid(31).unwrap().props().normal.z < 0.0);

    assert_eq!(memb.neighbor_pairs().len(), 64);
    assert_eq!(memb.splay().len(), 64);
    assert!(memb.splay().iter().all(|s| s.splay < 0.5));
    assert_eq!(memb.splay_of(5).count(), 4);
    Ok(())
}

#[test]
fn fluid_bilayer_invariants() -> anyhow::Result<()> {
    init_log();
    let (top, mut st) = bilayer(8, 2.0, 0.08)?;
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;

    // Total partition
    let leaflets = memb.leaflets().unwrap();
    assert_eq!(leaflets.members(0).len() + leaflets.members(1).len(), 128);
    assert!(memb.iter_lipids().all(|l| l.props().leaflet.is_some()));
    assert_eq!(leaflets.members(0).len(), 64);

    // Leaflet purity
    for (i, j) in memb.neighbor_pairs() {
        assert_eq!(leaflets.leaflet_of(*i), leaflets.leaflet_of(*j));
    }

    // Symmetric adjacency
    let graph = memb.neighbors().unwrap();
    for (i, j) in graph.pairs() {
        assert!(graph.neighbors_of(*i).contains(j));
        assert!(graph.neighbors_of(*j).contains(i));
    }

    // Angle ranges
    for lip in memb.iter_lipids().filter(|l| !l.props().degenerate) {
        assert!((0.0..=90.0).contains(&lip.props().tilt));
        assert!((lip.props().normal.norm() - 1.0).abs() < 1e-4);
    }
    for s in memb.splay() {
        assert!((0.0..=90.0).contains(&s.splay));
    }
    Ok(())
}

#[test]
fn markers_round_trip() -> anyhow::Result<()> {
    init_log();
    let (top, mut st) = bilayer(8, 2.0, 0.08)?;
    let orig = st.clone();
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;
    assert_eq!(st, orig);
    Ok(())
}

#[test]
fn repeated_computation_is_identical() -> anyhow::Result<()> {
    init_log();
    let (top, mut st) = bilayer(8, 2.0, 0.08)?;
    let mut memb = membrane(&top)?;

    memb.compute(&mut st)?;
    let first = memb.snapshot().unwrap().clone();
    memb.compute(&mut st)?;
    let second = memb.snapshot().unwrap();

    assert_eq!(first.leaflets, second.leaflets);
    assert_eq!(first.graph.pairs(), second.graph.pairs());
    let normals = |s: &FrameSnapshot| s.fits.iter().map(|f| f.normal).collect::<Vec<_>>();
    assert_eq!(normals(&first), normals(second));
    assert_eq!(memb.stats().num_frames(), 2);
    Ok(())
}

#[test]
fn previous_normals_as_seed() -> anyhow::Result<()> {
    init_log();
    let (top, mut st) = bilayer(6, 2.0, 0.05)?;
    let mut memb = membrane(&top)?;
    memb.options_mut().use_previous_normals = true;

    memb.compute(&mut st)?;
    let first: Vec<_> = memb.iter_lipids().map(|l| l.props().normal).collect();
    memb.compute(&mut st)?;
    for (lip, n) in memb.iter_lipids().zip(first) {
        assert!(lip.props().normal.dot(&n) > 0.999);
    }
    Ok(())
}

#[test]
fn close_leaflets_are_not_connected() -> anyhow::Result<()> {
    init_log();
    // Opposite lipids are 0.5 apart, same leaflet neighbours are 1.0 apart
    let (top, mut st) = bilayer(4, 0.5, 0.0)?;
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;

    let leaflets = memb.leaflets().unwrap();
    assert_ne!(leaflets.leaflet_of(0), leaflets.leaflet_of(16));
    let graph = memb.neighbors().unwrap();
    assert!(!graph.neighbors_of(0).contains(&16));
    for i in 0..32 {
        assert_eq!(graph.coord_number(i), 4);
    }
    Ok(())
}

#[test]
fn single_neighbor_is_degenerate() -> anyhow::Result<()> {
    init_log();
    let lips = [
        (Pos::new(0.0, 0.0, 0.0), Vector3f::z()),
        (Pos::new(1.0, 0.0, 0.0), Vector3f::z()),
        (Pos::new(2.0, 0.0, 0.0), Vector3f::z()),
        (Pos::new(1.0, 1.0, 0.0), Vector3f::z()),
    ];
    let (top, mut st) = system(&lips, None, 0.0);
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;

    let lone = memb.lipid(0).unwrap().props();
    assert_eq!(lone.coord_number, 1);
    assert!(lone.degenerate);
    assert!(lone.quad_fit_residual.is_nan());
    assert!(lone.mean_curvature.is_nan());
    assert!(lone.area.is_nan());
    assert!((lone.normal - Vector3f::z()).norm() < 1e-5);
    assert!(lone.tilt.is_nan());

    let center = memb.lipid(1).unwrap().props();
    assert_eq!(center.coord_number, 3);
    assert!(!center.degenerate);
    assert!(center.quad_fit_residual < 1e-5);
    // Cell is not closed from below
    assert!(center.area.is_nan());
    Ok(())
}

#[test]
fn writers() -> anyhow::Result<()> {
    init_log();
    let (top, st) = bilayer(4, 2.0, 0.0)?;
    let mut memb = membrane(&top)?;

    let dir = std::env::temp_dir();
    let smoothed = dir.join("molar_bilayer_smoothed.dat");
    let arrows = dir.join("molar_bilayer_arrows.tcl");
    let stats = dir.join("molar_bilayer_stats.dat");

    assert!(matches!(
        memb.write_smoothed(&smoothed),
        Err(MembraneError::NotComputed)
    ));
    assert!(matches!(
        memb.write_vmd_arrows(&arrows),
        Err(MembraneError::NotComputed)
    ));
    assert!(matches!(memb.write_stats(&stats), Err(MembraneError::NoStats)));
    assert!(memb.frame_summary().is_err());

    let mut st = st.with_time(10.0);
    memb.compute(&mut st)?;
    memb.write_smoothed(&smoothed)?;
    memb.write_vmd_arrows(&arrows)?;
    memb.write_stats(&stats)?;

    let s = std::fs::read_to_string(&smoothed)?;
    assert!(s.starts_with("# Smoothed lipid positions at t=10\n"));
    let rows: Vec<_> = s.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), 32);
    let first: Vec<_> = rows[0].split_whitespace().collect();
    assert_eq!(first[0], "0");
    assert_eq!(first[1], "LIP");
    assert_eq!(first[5], "0");

    let a = std::fs::read_to_string(&arrows)?;
    assert_eq!(a.matches("draw cone").count(), 32);

    let t = std::fs::read_to_string(&stats)?;
    assert!(t.contains("LIP"));

    let table = memb.frame_summary()?.to_string();
    assert!(table.contains("LIP"));
    Ok(())
}

#[test]
fn invalid_setup() -> anyhow::Result<()> {
    init_log();
    let (top, _st) = bilayer(2, 2.0, 0.0)?;
    let sel = TopologySelector::new(&top);

    let no_lipids = CONFIG.replace("resname LIP", "resname POPC");
    assert!(matches!(
        Membrane::from_config(&sel, &no_lipids),
        Err(MembraneError::EmptySpecies(_))
    ));

    let no_mid = CONFIG.replace("name C1 C2", "name C9");
    assert!(matches!(
        Membrane::from_config(&sel, &no_mid),
        Err(MembraneError::EmptyMarker { .. })
    ));

    let mut memb = Membrane::from_config(&sel, CONFIG)?;
    let mut wrong = State::new(vec![Pos::origin(); 3], None);
    assert!(matches!(
        memb.compute(&mut wrong),
        Err(MembraneError::StateSize { .. })
    ));
    assert!(matches!(
        memb.compute_properties(&mut wrong, 0.0, &Vector3f::zeros()),
        Err(MembraneError::InvalidCutoff(_))
    ));
    Ok(())
}

/// Spherical cap bilayer centered at the origin. Lipids sit on the square
/// grid `-n..=n` projected up to the spheres of radii `r_out` and `r_in`.
/// Outer lipids point outwards, inner ones point to the center.
fn sphere_cap(n: i32, r_out: f32, r_in: f32) -> (Topology, State) {
    let mut lips = vec![];
    for (r, sign) in [(r_out, 1.0), (r_in, -1.0)] {
        for ix in -n..=n {
            for iy in -n..=n {
                let (x, y) = (ix as f32, iy as f32);
                let p = Vector3f::new(x, y, (r * r - x * x - y * y).sqrt());
                lips.push((Pos::from(p), p.normalize() * sign));
            }
        }
    }
    system(&lips, None, 0.0)
}

#[test]
fn curved_bilayer() -> anyhow::Result<()> {
    init_log();
    let n = 3;
    let (r_out, r_in) = (10.0f32, 8.0f32);
    let (top, mut st) = sphere_cap(n, r_out, r_in);
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;

    let side = (2 * n + 1) as usize;
    let per_leaflet = side * side;
    let leaflets = memb.leaflets().unwrap();
    assert_eq!(leaflets.members(0), (0..per_leaflet).collect::<Vec<_>>().as_slice());
    let grid_id = |leaflet: usize, ix: i32, iy: i32| {
        leaflet * per_leaflet + (ix + n) as usize * side + (iy + n) as usize
    };

    for ix in -1..=1 {
        for iy in -1..=1 {
            let outer = memb.lipid(grid_id(0, ix, iy)).unwrap();
            let p = outer.props();
            let radial = p.smoothed_mid.coords.normalize();
            assert_eq!(p.coord_number, 4);
            assert!(p.normal.dot(&radial) > 0.99);
            assert!(p.tilt < 5.0);
            // Normal points away from the center of curvature
            assert!((p.mean_curvature + 1.0 / r_out).abs() < 0.2 / r_out);

            let inner = memb.lipid(grid_id(1, ix, iy)).unwrap();
            let p = inner.props();
            let radial = p.smoothed_mid.coords.normalize();
            assert_eq!(p.coord_number, 4);
            assert!(p.normal.dot(&radial) < -0.99);
            assert!(p.tilt < 5.0);
            // Normal points to the center of curvature
            assert!((p.mean_curvature - 1.0 / r_in).abs() < 0.2 / r_in);
        }
    }

    // Central lipids of both leaflets are umbilic points of the spheres
    let center = memb.lipid(grid_id(0, 0, 0)).unwrap().props();
    assert!((center.mean_curvature + 1.0 / r_out).abs() < 0.005);
    assert!((center.gaussian_curvature - 1.0 / (r_out * r_out)).abs() < 0.1 / (r_out * r_out));
    let center = memb.lipid(grid_id(1, 0, 0)).unwrap().props();
    assert!((center.mean_curvature - 1.0 / r_in).abs() < 0.005);
    assert!((center.gaussian_curvature - 1.0 / (r_in * r_in)).abs() < 0.1 / (r_in * r_in));
    Ok(())
}

/// Flat bilayer with all lipids tilted by `theta` degrees in the xz plane.
/// The lower leaflet is the mirror image of the upper one.
fn tilted_bilayer(n: usize, theta: f32) -> anyhow::Result<(Topology, State)> {
    let (s, c) = theta.to_radians().sin_cos();
    let mut lips = vec![];
    for (z, axis) in [(6.0, Vector3f::new(s, 0.0, c)), (4.0, Vector3f::new(s, 0.0, -c))] {
        for ix in 0..n {
            for iy in 0..n {
                lips.push((Pos::new(ix as f32, iy as f32, z), axis));
            }
        }
    }
    let pbox = PeriodicBox::from_extents(n as f32, n as f32, 10.0)?;
    Ok(system(&lips, Some(pbox), 0.0))
}

#[test]
fn tilted_lattice() -> anyhow::Result<()> {
    init_log();
    // Tilts above 90 degrees are folded
    for (theta, expected) in [(30.0f32, 30.0f32), (120.0, 60.0)] {
        let (top, mut st) = tilted_bilayer(4, theta)?;
        let mut memb = membrane(&top)?;
        memb.options_mut().external_normal = [0.0, 0.0, 1.0];
        memb.compute(&mut st)?;

        // Upper layer points down when the tilt is above 90 degrees
        let upper = if theta > 90.0 { 1 } else { 0 };
        let leaflets = memb.leaflets().unwrap();
        assert_eq!(leaflets.members(upper), (0..16usize).collect::<Vec<_>>().as_slice());
        assert_eq!(leaflets.members(1 - upper), (16..32usize).collect::<Vec<_>>().as_slice());

        for lip in memb.iter_lipids() {
            let p = lip.props();
            assert!(!p.degenerate);
            assert!(p.normal.z.abs() > 0.999);
            assert!((p.tilt - expected).abs() < 0.01);
        }

        for l in 0..2 {
            let tilt = memb.stats().get(l, "LIP").unwrap().tilt.compute().unwrap();
            assert!((tilt.mean - expected).abs() < 0.01);
        }
    }
    Ok(())
}

#[test]
fn degenerate_tilt_is_undefined() -> anyhow::Result<()> {
    init_log();
    // Isolated lipids tilted by 45 degrees
    let axis = Vector3f::new(1.0, 0.0, 1.0).normalize();
    let lips = [
        (Pos::new(0.0, 0.0, 0.0), axis),
        (Pos::new(5.0, 0.0, 0.0), axis),
        (Pos::new(10.0, 0.0, 0.0), axis),
    ];
    let (top, mut st) = system(&lips, None, 0.0);
    let mut memb = membrane(&top)?;
    memb.compute(&mut st)?;

    for lip in memb.iter_lipids() {
        assert!(lip.props().degenerate);
        assert!(lip.props().tilt.is_nan());
    }

    let mut num_degenerate = 0;
    for l in 0..2 {
        if let Some(sp) = memb.stats().get(l, "LIP") {
            assert_eq!(sp.tilt.count(), 0);
            assert!(sp.tilt.compute().is_none());
            num_degenerate += sp.num_degenerate;
        }
    }
    assert_eq!(num_degenerate, 3);
    Ok(())
}

#[test]
fn four_lipid_lattice_connects_diagonals() -> anyhow::Result<()> {
    init_log();
    // 2x2 lattice per leaflet with cutoff 1.5 times the spacing:
    // diagonal sites at 1.414 are within the cutoff,
    // so every lipid is connected to the three others
    let mut lips = vec![];
    for (z, dir) in [(1.0, 1.0), (-1.0, -1.0)] {
        for ix in 0..2 {
            for iy in 0..2 {
                lips.push((Pos::new(ix as f32, iy as f32, z), Vector3f::z() * dir));
            }
        }
    }
    let (top, mut st) = system(&lips, None, 0.0);
    let mut memb = membrane(&top)?;
    memb.compute_properties(&mut st, 1.5, &Vector3f::zeros())?;

    let leaflets = memb.leaflets().unwrap();
    assert_eq!(leaflets.members(0), &[0, 1, 2, 3]);
    assert_eq!(leaflets.members(1), &[4, 5, 6, 7]);
    assert_eq!(memb.neighbor_pairs().len(), 12);

    for lip in memb.iter_lipids() {
        let p = lip.props();
        assert_eq!(p.coord_number, 3);
        assert!(!p.degenerate);
        assert!(p.normal.z.abs() > 0.999);
        assert!(p.tilt < 0.5);
        assert!(p.quad_fit_residual < 1e-4);
    }
    Ok(())
}
