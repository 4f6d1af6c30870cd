//! 关节限位与换算的性质测试

use proptest::prelude::*;
use std::sync::Arc;
use ucp_client::{
    AxisConfig, ConfigContext, ControlError, DriveUnit, DriveUnitOps, JointLimits, MotorConfig,
};
use ucp_driver::UcpClient;
use ucp_protocol::Response;
use ucp_serial::{MockLink, MockReply};

fn ratio_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(1.0), Just(30.0), Just(50.0), 1.0f64..100.0]
}

proptest! {
    /// 关节 → 电机 → 关节 换算可逆
    #[test]
    fn prop_joint_drive_inverse(
        axis in 1u8..=6,
        ratio in ratio_strategy(),
        negative in any::<bool>(),
        joint in -180.0f64..180.0,
    ) {
        let mut motor = MotorConfig::identity();
        motor.set_axis(axis, AxisConfig { reducer_ratio: ratio, direction: if negative { -1 } else { 1 } });
        let back = motor.drive_to_joint(axis, motor.joint_to_drive(axis, joint));
        prop_assert!((back - joint).abs() < 1e-9);
    }

    /// 限位内的目标全部发出，限位外的目标一条也不发
    #[test]
    fn prop_guard_matches_limits(bound in 10.0f64..170.0, joint in -200.0f64..200.0) {
        let link = MockLink::with_responder(|_| MockReply::Respond(Response::ok(vec![])));
        let handle = link.handle();
        let client = Arc::new(UcpClient::from_link("mock", 115_200, Box::new(link)));
        let mut motor = MotorConfig::identity();
        motor.set_axis(4, AxisConfig { reducer_ratio: 30.0, direction: -1 });
        let config = Arc::new(ConfigContext::with_limits(JointLimits::symmetric(bound), motor));
        let unit = DriveUnit::new(4, client, config).unwrap();

        // 离边界太近时编码的 0.1° 量化可能影响判定，跳过
        prop_assume!((joint.abs() - bound).abs() > 0.01);
        let result = unit.move_to_position(joint, 100.0, true);
        if joint.abs() <= bound {
            prop_assert!(result.is_ok());
            prop_assert_eq!(handle.request_count(), 1);
        } else {
            let is_violation = matches!(result, Err(ControlError::LimitViolation { .. }));
            prop_assert!(is_violation);
            prop_assert_eq!(handle.request_count(), 0);
        }
    }
}
