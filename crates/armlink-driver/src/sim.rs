//! 仿真机械臂
//!
//! 不连接任何硬件的 [`RobotActuator`]：目标值直接写入状态，
//! 可选地按固定时长模拟运动耗时。用于 CLI 演示和集成测试。

use crate::actuator::{ActuationError, RobotActuator};
use armlink_protocol::{Command, ControlMode, JOINT_COUNT, SetupAction, StateSnapshot};
use nalgebra::Rotation3;
use std::time::Duration;
use tracing::{debug, info};

/// 仿真机械臂
#[derive(Debug, Clone)]
pub struct SimulatedArm {
    state: StateSnapshot,
    motion_time: Duration,
    active: Option<SetupAction>,
    motions: u64,
}

impl SimulatedArm {
    pub fn new() -> Self {
        Self::with_state(StateSnapshot::identity())
    }

    /// 从指定初始状态开始
    pub fn with_state(state: StateSnapshot) -> Self {
        Self {
            state,
            motion_time: Duration::ZERO,
            active: None,
            motions: 0,
        }
    }

    /// 每条命令的模拟运动时长
    pub fn with_motion_time(mut self, motion_time: Duration) -> Self {
        self.motion_time = motion_time;
        self
    }

    /// 当前激活的控制器
    pub fn active_controller(&self) -> Option<&SetupAction> {
        self.active.as_ref()
    }

    /// 已执行的运动次数
    pub fn motions(&self) -> u64 {
        self.motions
    }

    pub fn state(&self) -> &StateSnapshot {
        &self.state
    }
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

/// 欧拉角（外旋 xyz）转行优先旋转矩阵
fn orientation_from_rpy(roll: f64, pitch: f64, yaw: f64) -> [[f64; 3]; 3] {
    let rotation = Rotation3::from_euler_angles(roll, pitch, yaw);
    let m = rotation.matrix();
    std::array::from_fn(|row| std::array::from_fn(|col| m[(row, col)]))
}

impl RobotActuator for SimulatedArm {
    fn setup(&mut self, action: &SetupAction) -> Result<(), ActuationError> {
        info!(%action, "simulated controller switch");
        self.active = Some(*action);
        Ok(())
    }

    fn apply(&mut self, command: &Command) -> Result<(), ActuationError> {
        if self.active.is_none() {
            return Err(ActuationError::Motion("no controller active".into()));
        }

        let target = command.payload();
        match command.mode() {
            ControlMode::JointPosition => {
                self.state.joint_positions.copy_from_slice(&target[..JOINT_COUNT]);
                self.state.joint_velocities = [0.0; JOINT_COUNT];
            },
            ControlMode::EePosition => {
                self.state.ee_position.copy_from_slice(&target[..3]);
                if let [_, _, _, roll, pitch, yaw] = *target {
                    self.state.ee_orientation = orientation_from_rpy(roll, pitch, yaw);
                }
            },
            mode => return Err(ActuationError::Unsupported(mode)),
        }

        if !self.motion_time.is_zero() {
            std::thread::sleep(self.motion_time);
        }
        self.motions += 1;
        debug!(mode = %command.mode(), motions = self.motions, "simulated motion finished");
        Ok(())
    }

    fn read_state(&mut self) -> Result<StateSnapshot, ActuationError> {
        Ok(self.state)
    }
}
