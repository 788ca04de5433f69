//! 控制模式注册表
//!
//! 每个会话在握手时确定一个 [`ControlMode`]，此后不再改变。模式的全部
//! 差异（允许的载荷长度、执行端需要切换的控制器、是否允许重发）都集中在
//! [`ModeDescriptor`] 里，调度器、握手和报文封装只通过注册表查询，
//! 新增模式只需要加一个枚举成员和一条描述符。

use crate::ProtocolError;
use crate::message::CommandMessage;
use std::fmt;
use std::str::FromStr;

/// 关节阻抗控制器
pub const JOINT_IMPEDANCE_CONTROLLER: &str = "joint_impedance_controller";

/// 笛卡尔阻抗控制器
pub const CARTESIAN_IMPEDANCE_CONTROLLER: &str = "cartesian_impedance_controller";

/// 笛卡尔阻抗控制器默认参数文件
pub const DEFAULT_CARTESIAN_PARAMS: &str = "config/control/default_cartesian_impedance.yaml";

/// 控制模式
///
/// 线上名称见 [`ControlMode::name`]。`JointVelocity` 及之后的成员为预留模式：
/// 已在注册表中登记长度与控制器，但执行端可以拒绝执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMode {
    /// 关节位置（7 个值，弧度）
    JointPosition,
    /// 末端位置（x,y,z 或 x,y,z,roll,pitch,yaw）
    EePosition,
    /// 关节速度（预留）
    JointVelocity,
    /// 末端速度（预留）
    EeVelocity,
    /// 关节力矩（预留）
    JointTorque,
    /// 末端力（预留）
    EeForce,
}

impl ControlMode {
    /// 所有已定义的模式
    pub const ALL: [ControlMode; 6] = [
        ControlMode::JointPosition,
        ControlMode::EePosition,
        ControlMode::JointVelocity,
        ControlMode::EeVelocity,
        ControlMode::JointTorque,
        ControlMode::EeForce,
    ];

    /// 线上名称（握手 `control_mode` 字段与命令 `type` 字段）
    pub const fn name(self) -> &'static str {
        match self {
            ControlMode::JointPosition => "joint_position",
            ControlMode::EePosition => "ee_position",
            ControlMode::JointVelocity => "joint_velocity",
            ControlMode::EeVelocity => "ee_velocity",
            ControlMode::JointTorque => "joint_torque",
            ControlMode::EeForce => "ee_force",
        }
    }

    /// 按名称解析（忽略大小写与首尾空白）
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    /// 是否为预留模式
    pub const fn is_reserved(self) -> bool {
        !matches!(self, ControlMode::JointPosition | ControlMode::EePosition)
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ProtocolError::UnknownMode {
            name: s.trim().to_string(),
        })
    }
}

/// 执行端在进入某个模式前需要完成的控制器切换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupAction {
    /// 目标控制器名称
    pub controller: &'static str,
    /// 切换后需要加载的参数文件（由执行端解释）
    pub parameter_file: Option<&'static str>,
}

impl SetupAction {
    pub const fn switch_to(controller: &'static str) -> Self {
        Self {
            controller,
            parameter_file: None,
        }
    }

    pub const fn with_parameters(mut self, parameter_file: &'static str) -> Self {
        self.parameter_file = Some(parameter_file);
        self
    }
}

impl fmt::Display for SetupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "switch to {}", self.controller)?;
        if let Some(params) = self.parameter_file {
            write!(f, " (params: {})", params)?;
        }
        Ok(())
    }
}

/// 单条已校验命令
///
/// 只能通过 [`ModeDescriptor`] 构造，因此载荷长度一定属于模式允许的集合，
/// 且所有值都是有限数。
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    mode: ControlMode,
    payload: Vec<f64>,
}

impl Command {
    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn payload(&self) -> &[f64] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<f64> {
        self.payload
    }
}

/// 模式描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDescriptor {
    /// 对应的控制模式
    pub mode: ControlMode,
    /// 允许的载荷长度
    pub allowed_arities: &'static [usize],
    /// 执行端的控制器切换动作
    pub setup_action: SetupAction,
    /// 命令是否为绝对目标（重复执行无副作用），决定超时后能否重发
    pub resend_safe: bool,
}

impl ModeDescriptor {
    pub fn name(&self) -> &'static str {
        self.mode.name()
    }

    pub fn accepts(&self, arity: usize) -> bool {
        self.allowed_arities.contains(&arity)
    }

    /// 校验载荷长度与数值
    pub fn validate(&self, values: &[f64]) -> Result<(), ProtocolError> {
        if !self.accepts(values.len()) {
            return Err(ProtocolError::ArityMismatch {
                mode: self.mode,
                allowed: self.allowed_arities,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ProtocolError::InvalidValue {
                index,
                token: values[index].to_string(),
            });
        }
        Ok(())
    }

    /// 构造命令（不截断、不补齐）
    pub fn command(&self, payload: Vec<f64>) -> Result<Command, ProtocolError> {
        self.validate(&payload)?;
        Ok(Command {
            mode: self.mode,
            payload,
        })
    }

    /// 解析命令文件中的一行（逗号分隔的数值）
    pub fn parse_line(&self, line: &str) -> Result<Command, ProtocolError> {
        let payload = line
            .split(',')
            .enumerate()
            .map(|(index, token)| {
                let token = token.trim();
                token
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ProtocolError::InvalidValue {
                        index,
                        token: token.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.command(payload)
    }

    /// 编码为命令报文
    pub fn encode(&self, values: &[f64], seq: Option<u64>) -> Result<Vec<u8>, ProtocolError> {
        self.validate(values)?;
        let message = CommandMessage {
            kind: self.name().to_string(),
            data: values.to_vec(),
            seq,
        };
        Ok(serde_json::to_vec(&message)?)
    }

    /// 从已解析的命令报文还原命令
    pub fn decode_message(&self, message: &CommandMessage) -> Result<Command, ProtocolError> {
        if !message.kind.eq_ignore_ascii_case(self.name()) {
            return Err(ProtocolError::ModeMismatch {
                expected: self.mode,
                actual: message.kind.clone(),
            });
        }
        self.command(message.data.clone())
    }

    /// 从原始数据报解码命令
    pub fn decode(&self, bytes: &[u8]) -> Result<Command, ProtocolError> {
        let message: CommandMessage = serde_json::from_slice(bytes)?;
        self.decode_message(&message)
    }
}

/// 控制模式注册表
///
/// 默认内容见 [`ModeRegistry::standard`]。
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    entries: Vec<ModeDescriptor>,
}

impl ModeRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 内置的六种模式
    pub fn standard() -> Self {
        let joint = SetupAction::switch_to(JOINT_IMPEDANCE_CONTROLLER);
        let cartesian = SetupAction::switch_to(CARTESIAN_IMPEDANCE_CONTROLLER);

        let mut registry = Self::empty();
        registry.register(ModeDescriptor {
            mode: ControlMode::JointPosition,
            allowed_arities: &[7],
            setup_action: joint,
            resend_safe: true,
        });
        registry.register(ModeDescriptor {
            mode: ControlMode::EePosition,
            allowed_arities: &[3, 6],
            setup_action: cartesian.with_parameters(DEFAULT_CARTESIAN_PARAMS),
            resend_safe: true,
        });
        registry.register(ModeDescriptor {
            mode: ControlMode::JointVelocity,
            allowed_arities: &[7],
            setup_action: joint,
            resend_safe: false,
        });
        registry.register(ModeDescriptor {
            mode: ControlMode::EeVelocity,
            allowed_arities: &[6],
            setup_action: cartesian,
            resend_safe: false,
        });
        registry.register(ModeDescriptor {
            mode: ControlMode::JointTorque,
            allowed_arities: &[7],
            setup_action: joint,
            resend_safe: false,
        });
        registry.register(ModeDescriptor {
            mode: ControlMode::EeForce,
            allowed_arities: &[6],
            setup_action: cartesian,
            resend_safe: false,
        });
        registry
    }

    /// 登记或替换一个模式，返回被替换的旧描述符
    pub fn register(&mut self, descriptor: ModeDescriptor) -> Option<ModeDescriptor> {
        match self.entries.iter_mut().find(|d| d.mode == descriptor.mode) {
            Some(slot) => Some(std::mem::replace(slot, descriptor)),
            None => {
                self.entries.push(descriptor);
                None
            },
        }
    }

    /// 按线上名称查找
    pub fn lookup(&self, name: &str) -> Result<&ModeDescriptor, ProtocolError> {
        let unknown = || ProtocolError::UnknownMode {
            name: name.trim().to_string(),
        };
        let mode = ControlMode::from_name(name).ok_or_else(unknown)?;
        self.descriptor(mode).map_err(|_| unknown())
    }

    /// 按模式查找
    pub fn descriptor(&self, mode: ControlMode) -> Result<&ModeDescriptor, ProtocolError> {
        self.entries
            .iter()
            .find(|d| d.mode == mode)
            .ok_or_else(|| ProtocolError::UnknownMode {
                name: mode.name().to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModeDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HOME: [f64; 7] = [0.0, -0.785, 0.0, -2.356, 0.0, 1.571, 0.785];

    #[test]
    fn test_mode_names_roundtrip() {
        for mode in ControlMode::ALL {
            assert_eq!(ControlMode::from_name(mode.name()), Some(mode));
            assert_eq!(mode.to_string(), mode.name());
        }
        assert_eq!(
            ControlMode::from_name("  Joint_Position \n"),
            Some(ControlMode::JointPosition)
        );
        assert_eq!(ControlMode::from_name("joint_pos"), None);
        assert!("cartesian".parse::<ControlMode>().is_err());
    }

    #[test]
    fn test_standard_registry_contents() {
        let registry = ModeRegistry::standard();
        assert_eq!(registry.len(), 6);

        let joint = registry.lookup("joint_position").unwrap();
        assert_eq!(joint.allowed_arities, &[7]);
        assert_eq!(joint.setup_action.controller, JOINT_IMPEDANCE_CONTROLLER);

        let ee = registry.lookup("ee_position").unwrap();
        assert_eq!(ee.allowed_arities, &[3, 6]);
        assert_eq!(ee.setup_action.controller, CARTESIAN_IMPEDANCE_CONTROLLER);
        assert_eq!(ee.setup_action.parameter_file, Some(DEFAULT_CARTESIAN_PARAMS));

        for name in ["ee_velocity", "ee_force"] {
            assert_eq!(registry.lookup(name).unwrap().allowed_arities, &[6]);
        }
        for name in ["joint_velocity", "joint_torque"] {
            assert_eq!(registry.lookup(name).unwrap().allowed_arities, &[7]);
        }
    }

    #[test]
    fn test_lookup_unknown_mode() {
        let registry = ModeRegistry::standard();
        match registry.lookup("gripper") {
            Err(ProtocolError::UnknownMode { name }) => assert_eq!(name, "gripper"),
            other => panic!("Expected UnknownMode, got {:?}", other),
        }

        // 名称合法但未登记
        let empty = ModeRegistry::empty();
        assert!(matches!(
            empty.lookup("joint_position"),
            Err(ProtocolError::UnknownMode { .. })
        ));
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = ModeRegistry::standard();
        let custom = ModeDescriptor {
            mode: ControlMode::EeForce,
            allowed_arities: &[3, 6],
            setup_action: SetupAction::switch_to("force_controller"),
            resend_safe: false,
        };
        let old = registry.register(custom.clone()).unwrap();
        assert_eq!(old.allowed_arities, &[6]);
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.descriptor(ControlMode::EeForce).unwrap(), &custom);
    }

    #[test]
    fn test_joint_position_arity() {
        let registry = ModeRegistry::standard();
        let joint = registry.descriptor(ControlMode::JointPosition).unwrap();

        assert!(joint.command(HOME.to_vec()).is_ok());
        for len in [0, 1, 6, 8, 14] {
            match joint.command(vec![0.0; len]) {
                Err(ProtocolError::ArityMismatch { actual, .. }) => assert_eq!(actual, len),
                other => panic!("len {} should be rejected, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_ee_position_arity() {
        let registry = ModeRegistry::standard();
        let ee = registry.descriptor(ControlMode::EePosition).unwrap();

        assert!(ee.command(vec![0.4, 0.0, 0.5]).is_ok());
        assert!(ee.command(vec![0.4, 0.0, 0.5, 3.14, 0.0, 0.0]).is_ok());
        for len in [0, 2, 4, 5, 7] {
            assert!(ee.command(vec![0.1; len]).is_err(), "len {}", len);
        }
    }

    #[test]
    fn test_parse_line() {
        let registry = ModeRegistry::standard();
        let ee = registry.descriptor(ControlMode::EePosition).unwrap();

        let cmd = ee.parse_line(" 0.4, 0.0 ,0.5 ").unwrap();
        assert_eq!(cmd.mode(), ControlMode::EePosition);
        assert_eq!(cmd.payload(), &[0.4, 0.0, 0.5]);

        match ee.parse_line("0.4,abc,0.5") {
            Err(ProtocolError::InvalidValue { index, token }) => {
                assert_eq!(index, 1);
                assert_eq!(token, "abc");
            },
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        // 空字段、非有限值都视为格式错误
        assert!(ee.parse_line("0.4,,0.5").is_err());
        assert!(ee.parse_line("0.4,0.0,").is_err());
        assert!(ee.parse_line("0.4,NaN,0.5").is_err());
        assert!(ee.parse_line("0.4,inf,0.5").is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let registry = ModeRegistry::standard();
        let ee = registry.descriptor(ControlMode::EePosition).unwrap();
        assert!(matches!(
            ee.validate(&[0.0, f64::NAN, 0.0]),
            Err(ProtocolError::InvalidValue { index: 1, .. })
        ));
    }

    #[test]
    fn test_decode_mode_mismatch() {
        let registry = ModeRegistry::standard();
        let joint = registry.descriptor(ControlMode::JointPosition).unwrap();
        let ee = registry.descriptor(ControlMode::EePosition).unwrap();

        let bytes = ee.encode(&[0.4, 0.0, 0.5], None).unwrap();
        match joint.decode(&bytes) {
            Err(ProtocolError::ModeMismatch { expected, actual }) => {
                assert_eq!(expected, ControlMode::JointPosition);
                assert_eq!(actual, "ee_position");
            },
            other => panic!("Expected ModeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_setup_action_display() {
        let registry = ModeRegistry::standard();
        let ee = registry.descriptor(ControlMode::EePosition).unwrap();
        assert_eq!(
            ee.setup_action.to_string(),
            "switch to cartesian_impedance_controller (params: config/control/default_cartesian_impedance.yaml)"
        );
        let joint = registry.descriptor(ControlMode::JointPosition).unwrap();
        assert_eq!(joint.setup_action.to_string(), "switch to joint_impedance_controller");
    }

    fn mode_and_payload() -> impl Strategy<Value = (ControlMode, Vec<f64>)> {
        let registry = ModeRegistry::standard();
        let cases: Vec<(ControlMode, usize)> = registry
            .iter()
            .flat_map(|d| d.allowed_arities.iter().map(move |&n| (d.mode, n)))
            .collect();
        prop::sample::select(cases).prop_flat_map(|(mode, arity)| {
            (Just(mode), prop::collection::vec(-1.0e6..1.0e6f64, arity))
        })
    }

    proptest! {
        /// 所有模式、所有允许长度下编码后再解码得到原载荷
        #[test]
        fn encode_decode_roundtrip(
            (mode, payload) in mode_and_payload(),
            seq in proptest::option::of(0u64..1_000_000)
        ) {
            let registry = ModeRegistry::standard();
            let descriptor = registry.descriptor(mode).unwrap();
            let bytes = descriptor.encode(&payload, seq).unwrap();
            let decoded = descriptor.decode(&bytes).unwrap();
            prop_assert_eq!(decoded.mode(), mode);
            prop_assert_eq!(decoded.payload(), payload.as_slice());
        }

        /// 不在允许集合内的长度一律拒绝
        #[test]
        fn disallowed_arity_rejected(mode_index in 0usize..6, len in 0usize..16) {
            let registry = ModeRegistry::standard();
            let descriptor = registry.descriptor(ControlMode::ALL[mode_index]).unwrap();
            let result = descriptor.command(vec![0.5; len]);
            prop_assert_eq!(result.is_ok(), descriptor.allowed_arities.contains(&len));
        }
    }
}
