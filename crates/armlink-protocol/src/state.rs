//! 机器人状态快照

use serde::{Deserialize, Serialize};

/// 关节数量
pub const JOINT_COUNT: usize = 7;

/// 执行端在每条命令执行完后上报的完整状态
///
/// 所有数组长度固定，反序列化时长度不符直接报错，不存在"部分快照"。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// 关节位置（rad）[J1..J7]
    pub joint_positions: [f64; JOINT_COUNT],
    /// 关节速度（rad/s）[J1..J7]
    pub joint_velocities: [f64; JOINT_COUNT],
    /// 关节力矩（N·m）[J1..J7]
    pub joint_efforts: [f64; JOINT_COUNT],
    /// 末端位置（m）[x, y, z]
    pub ee_position: [f64; 3],
    /// 末端姿态（3×3 旋转矩阵，行优先）
    pub ee_orientation: [[f64; 3]; 3],
}

impl StateSnapshot {
    /// 单位姿态、其余全零的快照
    pub fn identity() -> Self {
        Self {
            ee_orientation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            ..Self::default()
        }
    }
}
