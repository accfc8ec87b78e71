use super::{CODE_CUSTOM, CODE_ENGINE, CODE_POSITION_SINGLE, CODE_REBOOT, PROTOCOL_NAME};
use crate::codec::{Message, ProtocolEncoder};
use crate::error::EncodeError;
use chrono::Utc;
use domain::command::KEY_DATA;
use domain::{Command, CommandType, Device};

pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Clone, Copy)]
pub struct MobilogixEncoder;

impl MobilogixEncoder {
    /// 以指定时间戳文本编码（`encode` 使用当前 UTC 时间）
    pub fn encode_at(
        &self,
        command: &Command,
        device: &Device,
        time: &str,
    ) -> Result<Message, EncodeError> {
        let (code, payload) = match command.kind {
            CommandType::Custom => {
                let data = command
                    .get(KEY_DATA)
                    .ok_or(EncodeError::MissingParameter(KEY_DATA))?;
                if data.contains(']') {
                    return Err(EncodeError::InvalidParameter {
                        key: KEY_DATA,
                        reason: "must not contain frame delimiter ']'".to_string(),
                    });
                }
                (CODE_CUSTOM, Some(data))
            }
            CommandType::EngineStop => (CODE_ENGINE, Some("1")),
            CommandType::EngineResume => (CODE_ENGINE, Some("0")),
            CommandType::PositionSingle => (CODE_POSITION_SINGLE, None),
            CommandType::RebootDevice => (CODE_REBOOT, None),
            kind => {
                return Err(EncodeError::Unsupported {
                    protocol: PROTOCOL_NAME,
                    kind,
                })
            }
        };

        let mut text = format!("[{time},S{code},{}", device.unique_id);
        if let Some(payload) = payload {
            text.push(',');
            text.push_str(payload);
        }
        text.push(']');
        Ok(Message::Text(text))
    }
}

impl ProtocolEncoder for MobilogixEncoder {
    fn encode(&self, command: &Command, device: &Device) -> Result<Message, EncodeError> {
        let time = Utc::now().format(TIME_FORMAT).to_string();
        self.encode_at(command, device, &time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME: &str = "2024-05-01 08:00:00";

    fn device() -> Device {
        Device::new(7, "201951132031", "truck-7")
    }

    fn encode(command: Command) -> Result<String, EncodeError> {
        MobilogixEncoder
            .encode_at(&command, &device(), TIME)
            .map(|message| message.as_text().unwrap_or_default().to_string())
    }

    #[test]
    fn engine_commands() {
        assert_eq!(
            encode(Command::new(7, CommandType::EngineStop)).expect("stop"),
            "[2024-05-01 08:00:00,S41,201951132031,1]"
        );
        assert_eq!(
            encode(Command::new(7, CommandType::EngineResume)).expect("resume"),
            "[2024-05-01 08:00:00,S41,201951132031,0]"
        );
    }

    #[test]
    fn commands_without_payload() {
        assert_eq!(
            encode(Command::new(7, CommandType::PositionSingle)).expect("position"),
            "[2024-05-01 08:00:00,S32,201951132031]"
        );
        assert_eq!(
            encode(Command::new(7, CommandType::RebootDevice)).expect("reboot"),
            "[2024-05-01 08:00:00,S39,201951132031]"
        );
    }

    #[test]
    fn custom_requires_data() {
        assert!(matches!(
            encode(Command::new(7, CommandType::Custom)),
            Err(EncodeError::MissingParameter("data"))
        ));
        assert_eq!(
            encode(Command::new(7, CommandType::Custom).with(KEY_DATA, "APN,internet")).expect("custom"),
            "[2024-05-01 08:00:00,S30,201951132031,APN,internet]"
        );
        assert!(matches!(
            encode(Command::new(7, CommandType::Custom).with(KEY_DATA, "a]b")),
            Err(EncodeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn current_time_is_formatted() {
        let message = MobilogixEncoder
            .encode(&Command::new(7, CommandType::RebootDevice), &device())
            .expect("encode");
        let text = message.as_text().expect("text");
        let time = &text[1..20];
        assert!(chrono::NaiveDateTime::parse_from_str(time, TIME_FORMAT).is_ok());
    }
}
