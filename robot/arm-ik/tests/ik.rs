use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::{Point3, Rotation3, Vector3};

use arm_ik::{
    positioning_rotation, wrist_rotation, ArmGeometry, IkError, IkSolver, IkTarget, JointLimits,
    TargetFrame, Workspace, WristOrientation, NUM_JOINTS,
};

fn default_solver() -> IkSolver {
    IkSolver::new(
        ArmGeometry::default(),
        Workspace::default(),
        JointLimits::default(),
    )
    .unwrap()
}

#[test]
fn test_forward_of_inverse_reaches_target() {
    let ik = default_solver();
    let mut checked = 0;
    for xi in 0..=5 {
        for yi in -2..=2 {
            for zi in 1..=6 {
                let target = Point3::new(5.0 * xi as f64, 10.0 * yi as f64, 5.0 * zi as f64);
                let sol = ik.solve_position(&target).unwrap();
                assert_eq!(sol.clamped_target, target);
                if sol.saturated {
                    continue;
                }
                let reached = ik.forward_position(&sol.theta).unwrap();
                assert_relative_eq!(reached, target, epsilon = 1e-9);
                checked += 1;
            }
        }
    }
    assert!(checked > 50, "only {checked} targets unsaturated");
}

#[test]
fn test_targets_outside_workspace_are_clamped() {
    let ik = default_solver();
    let outside = ik.solve_position(&Point3::new(60.0, -90.0, 200.0)).unwrap();
    assert_eq!(outside.clamped_target, Point3::new(25.0, -25.0, 30.0));
    let corner = ik.solve_position(&Point3::new(25.0, -25.0, 30.0)).unwrap();
    assert_eq!(outside.theta, corner.theta);
}

#[test]
fn test_continuous_across_workspace_boundary() {
    let ik = default_solver();
    for (inside, outside) in [
        (Point3::new(25.0 - 1e-9, 3.0, 15.0), Point3::new(25.0 + 1e-9, 3.0, 15.0)),
        (Point3::new(10.0, 25.0 - 1e-9, 15.0), Point3::new(10.0, 25.0 + 1e-9, 15.0)),
        (Point3::new(10.0, 0.0, 5.0 + 1e-9), Point3::new(10.0, 0.0, 5.0 - 1e-9)),
    ] {
        let a = ik.solve_position(&inside).unwrap();
        let b = ik.solve_position(&outside).unwrap();
        for (ta, tb) in a.theta.iter().zip(b.theta.iter()) {
            assert!((ta - tb).abs() < 1e-6, "{ta} vs {tb}");
        }
    }
}

#[test]
fn test_camera_origin_maps_to_zero_base_angle() {
    let ik = default_solver();
    let arm = TargetFrame::default().to_arm(&Point3::origin());
    let sol = ik.solve_position(&arm).unwrap();
    assert_eq!(sol.clamped_target, Point3::new(25.0, 0.0, 5.0));
    assert_eq!(sol.theta[0], 0.0);
}

#[test]
fn test_unreachable_with_short_links() {
    let ik = IkSolver::new(
        ArmGeometry {
            d1: 20.0,
            a2: 5.0,
            d4: 5.0,
        },
        Workspace::default(),
        JointLimits::default(),
    )
    .unwrap();
    match ik.solve_position(&Point3::new(25.0, 0.0, 20.0)) {
        Err(IkError::UnreachableTarget { cos_elbow }) => assert!(cos_elbow > 1.0),
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[test]
fn test_invalid_geometry_rejected() {
    let result = IkSolver::new(
        ArmGeometry {
            a2: 0.0,
            ..Default::default()
        },
        Workspace::default(),
        JointLimits::default(),
    );
    assert!(matches!(result, Err(IkError::InvalidParameter(_))));
}

#[test]
fn test_orientation_reached() {
    let ik = default_solver();
    let orientation = WristOrientation {
        alpha: 0.3,
        miu: -0.4,
        phi: 0.5,
    };
    let target = IkTarget::with_orientation(Point3::new(20.0, 5.0, 20.0), orientation);
    let sol = ik.solve(&target).unwrap();
    assert_eq!(sol.theta.len(), NUM_JOINTS);
    assert!(!sol.saturated);
    assert!(!sol.gimbal_lock);
    let achieved = ik.forward_rotation(&sol.theta).unwrap();
    assert_relative_eq!(
        achieved.matrix(),
        orientation.rotation().matrix(),
        epsilon = 1e-9
    );

    let cfg = ik.solve_configuration(&target).unwrap();
    assert_eq!(cfg.len(), NUM_JOINTS);
    for (i, angle) in cfg.angles().iter().enumerate() {
        assert!(ik.limits().get(i).contains(*angle));
    }
}

#[test]
fn test_gimbal_lock_pitch_zero() {
    let ik = default_solver();
    let position = Point3::new(20.0, 5.0, 20.0);
    let base = ik.solve_position(&position).unwrap();
    let r03 = positioning_rotation(base.theta[0], base.theta[1], base.theta[2]);
    let roll = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7);
    let target_rotation = r03 * roll;

    let sol = ik.solve_with_rotation(&position, &target_rotation).unwrap();
    assert!(sol.gimbal_lock);
    assert_relative_eq!(sol.theta[3], 0.7, epsilon = 1e-9);
    assert_eq!(sol.theta[4], 0.0);
    assert_eq!(sol.theta[5], 0.0);
    let achieved = ik.forward_rotation(&sol.theta).unwrap();
    assert_relative_eq!(achieved.matrix(), target_rotation.matrix(), epsilon = 1e-9);
}

#[test]
fn test_gimbal_lock_pitch_pi() {
    let ik = default_solver();
    let position = Point3::new(15.0, -10.0, 25.0);
    let base = ik.solve_position(&position).unwrap();
    let r03 = positioning_rotation(base.theta[0], base.theta[1], base.theta[2]);
    let target_rotation = r03 * wrist_rotation(0.9, PI, 0.3);

    let sol = ik.solve_with_rotation(&position, &target_rotation).unwrap();
    assert!(sol.gimbal_lock);
    assert_eq!(sol.theta[4], PI);
    assert_eq!(sol.theta[5], 0.0);
    assert_relative_eq!(sol.theta[3], 0.6, epsilon = 1e-9);
    let achieved = ik.forward_rotation(&sol.theta).unwrap();
    assert_relative_eq!(achieved.matrix(), target_rotation.matrix(), epsilon = 1e-9);
}

#[test]
fn test_config_sections_deserialize() {
    let ws: Workspace = serde_json::from_str(r#"{"x_max": 30.0}"#).unwrap();
    assert_eq!(ws.x_max, 30.0);
    assert_eq!(ws.z_base, Workspace::default().z_base);
    assert!(serde_json::from_str::<Workspace>(r#"{"w_max": 1.0}"#).is_err());
    let geom: ArmGeometry = serde_json::from_str("{}").unwrap();
    assert_eq!(geom, ArmGeometry::default());
}
