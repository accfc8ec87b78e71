use super::encoder::TIME_FORMAT;
use super::{CODE_CUSTOM, CODE_ENGINE, CODE_POSITION_SINGLE, CODE_REBOOT, PROTOCOL_NAME};
use crate::codec::{Message, ProtocolDecoder};
use crate::connection::ConnectionContext;
use crate::error::DecodeError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use domain::{now_epoch_ms, CommandType, Position};

const KNOTS_PER_KPH: f64 = 0.539_957;
const LOGIN_TYPE: u32 = 1;
const REPORT_FIELDS: usize = 12;

#[derive(Debug, Default)]
pub struct MobilogixDecoder;

impl MobilogixDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolDecoder for MobilogixDecoder {
    async fn decode(
        &mut self,
        ctx: &mut ConnectionContext,
        message: Message,
    ) -> Result<Vec<Position>, DecodeError> {
        let text = message
            .as_text()
            .ok_or_else(|| DecodeError::malformed("expected text frame"))?;
        let sentence = text.trim();
        let sentence = sentence.strip_suffix(']').unwrap_or(sentence).trim();
        if sentence.is_empty() {
            return Err(DecodeError::malformed("empty frame"));
        }

        match sentence.strip_prefix('[') {
            Some(body) => decode_sentence(ctx, body).await,
            None => decode_compact(ctx, sentence).await,
        }
    }
}

async fn decode_compact(
    ctx: &mut ConnectionContext,
    sentence: &str,
) -> Result<Vec<Position>, DecodeError> {
    let fields: Vec<&str> = sentence.split(',').map(str::trim).collect();
    if !(4..=6).contains(&fields.len()) {
        return Err(DecodeError::malformed(format!(
            "compact report expects 4-6 fields, got {}",
            fields.len()
        )));
    }
    let unique_id = fields[0];
    if unique_id.is_empty() {
        return Err(DecodeError::malformed("missing device id"));
    }
    let latitude = number(fields[1], "latitude")?;
    let longitude = number(fields[2], "longitude")?;
    check_coordinates(latitude, longitude)?;
    let speed = number(fields[3], "speed")?;
    let course = fields.get(4).map(|v| number(v, "course")).transpose()?;
    let altitude = fields.get(5).map(|v| number(v, "altitude")).transpose()?;

    let session = ctx.resolve_device(unique_id).await?;
    let now = now_epoch_ms();
    let mut position = Position::new(session.device_id, PROTOCOL_NAME, now);
    position.valid = true;
    position.latitude = latitude;
    position.longitude = longitude;
    position.speed = speed;
    position.course = course.unwrap_or_default();
    position.altitude = altitude.unwrap_or_default();
    Ok(vec![position])
}

async fn decode_sentence(
    ctx: &mut ConnectionContext,
    body: &str,
) -> Result<Vec<Position>, DecodeError> {
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(DecodeError::malformed("sentence too short"));
    }
    let time = fields[0];
    let device_time_ms = parse_time(time)?;
    let kind = fields[1];
    let (prefix, code) = split_type(kind)?;

    match prefix {
        'T' if code == LOGIN_TYPE => {
            let imei = field(&fields, 4, "imei")?;
            ctx.resolve_device(imei).await?;
            ctx.reply(Message::Text(format!("[{time},S1,1]")))?;
            Ok(Vec::new())
        }
        'T' => {
            let report = Report::parse(&fields)?;
            let session = ctx.resolve_device(report.imei).await?;
            ctx.reply(Message::Text(format!("[{time},S{code}]")))?;

            let mut position = Position::new(session.device_id, PROTOCOL_NAME, now_epoch_ms());
            position.device_time_ms = device_time_ms;
            position.valid = report.satellites > 0;
            position.latitude = report.latitude;
            position.longitude = report.longitude;
            position.speed = report.speed_kph * KNOTS_PER_KPH;
            position.course = report.course;
            position.set("type", kind);
            position.set("index", report.index);
            position.set("firmware", report.firmware);
            position.set("status", report.status as i64);
            position.set("ignition", report.status & 0x01 != 0);
            position.set("motion", report.status & 0x02 != 0);
            position.set("power", report.power);
            position.set("sat", report.satellites as i64);
            Ok(vec![position])
        }
        _ => {
            let imei = field(&fields, 2, "imei")?;
            if fields.len() < 4 {
                return Err(DecodeError::malformed("command result without payload"));
            }
            let result = fields[3..].join(",");
            let session = ctx.resolve_device(imei).await?;

            let mut position = Position::new(session.device_id, PROTOCOL_NAME, now_epoch_ms());
            position.device_time_ms = device_time_ms;
            position.set("type", kind);
            if let Some(command) = acknowledged_command(code, &result) {
                position.set("command", command.as_str());
            }
            position.set("result", result);
            Ok(vec![position])
        }
    }
}

struct Report<'a> {
    index: &'a str,
    firmware: &'a str,
    imei: &'a str,
    status: u32,
    power: f64,
    satellites: u32,
    latitude: f64,
    longitude: f64,
    speed_kph: f64,
    course: f64,
}

impl<'a> Report<'a> {
    fn parse(fields: &[&'a str]) -> Result<Self, DecodeError> {
        if fields.len() != REPORT_FIELDS {
            return Err(DecodeError::malformed(format!(
                "report expects {REPORT_FIELDS} fields, got {}",
                fields.len()
            )));
        }
        let status = u32::from_str_radix(fields[5], 16)
            .map_err(|_| DecodeError::malformed(format!("invalid status: {}", fields[5])))?;
        let satellites = fields[7]
            .parse::<u32>()
            .map_err(|_| DecodeError::malformed(format!("invalid satellites: {}", fields[7])))?;
        let latitude = number(fields[8], "latitude")?;
        let longitude = number(fields[9], "longitude")?;
        check_coordinates(latitude, longitude)?;
        Ok(Self {
            index: fields[2],
            firmware: fields[3],
            imei: field(fields, 4, "imei")?,
            status,
            power: number(fields[6], "power")?,
            satellites,
            latitude,
            longitude,
            speed_kph: number(fields[10], "speed")?,
            course: number(fields[11], "course")?,
        })
    }
}

/// 回执编号对应的命令类型；引擎命令由回执结果区分启停
fn acknowledged_command(code: u32, result: &str) -> Option<CommandType> {
    match code {
        CODE_CUSTOM => Some(CommandType::Custom),
        CODE_POSITION_SINGLE => Some(CommandType::PositionSingle),
        CODE_REBOOT => Some(CommandType::RebootDevice),
        CODE_ENGINE => match result {
            "1" => Some(CommandType::EngineStop),
            "0" => Some(CommandType::EngineResume),
            _ => None,
        },
        _ => None,
    }
}

fn split_type(kind: &str) -> Result<(char, u32), DecodeError> {
    let mut chars = kind.chars();
    let prefix = chars
        .next()
        .filter(|c| *c == 'T' || *c == 'R')
        .ok_or_else(|| DecodeError::malformed(format!("unknown sentence type: {kind}")))?;
    let number = chars
        .as_str()
        .parse::<u32>()
        .map_err(|_| DecodeError::malformed(format!("unknown sentence type: {kind}")))?;
    Ok((prefix, number))
}

fn parse_time(value: &str) -> Result<i64, DecodeError> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map(|time| time.and_utc().timestamp_millis())
        .map_err(|_| DecodeError::malformed(format!("invalid time: {value}")))
}

fn field<'a>(fields: &[&'a str], index: usize, name: &str) -> Result<&'a str, DecodeError> {
    fields
        .get(index)
        .copied()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DecodeError::malformed(format!("missing {name}")))
}

fn number(value: &str, name: &str) -> Result<f64, DecodeError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::malformed(format!("invalid {name}: {value}")))
}

fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), DecodeError> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(DecodeError::malformed(format!(
            "coordinates out of range: {latitude},{longitude}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryChannel, ChannelHandle};
    use crate::mobilogix::MobilogixProtocol;
    use crate::module::ProtocolModule;
    use crate::session::SessionRegistry;
    use crate::types::TransportKind;
    use domain::{AttributeValue, Command, Device};
    use gateway_storage::InMemoryDeviceDirectory;
    use std::sync::Arc;

    struct Harness {
        ctx: ConnectionContext,
        memory: MemoryChannel,
        channel: ChannelHandle,
        sessions: Arc<SessionRegistry>,
    }

    fn harness() -> Harness {
        let directory = InMemoryDeviceDirectory::new();
        directory
            .insert(Device::new(1, "ID123", "compact"))
            .expect("insert");
        directory
            .insert(Device::new(2, "201951132031", "full"))
            .expect("insert");
        directory
            .insert(Device::new(3, "OFF1", "off").disabled())
            .expect("insert");
        let sessions = Arc::new(SessionRegistry::new());
        let (channel, memory) =
            MemoryChannel::open("127.0.0.1:6000".parse().expect("addr"), TransportKind::Tcp, 8);
        let ctx = ConnectionContext::new(
            channel.clone(),
            Arc::new(MobilogixProtocol::new()),
            Arc::new(directory),
            Arc::clone(&sessions),
        );
        Harness {
            ctx,
            memory,
            channel,
            sessions,
        }
    }

    async fn decode(h: &mut Harness, frame: &str) -> Result<Vec<Position>, DecodeError> {
        MobilogixDecoder::new()
            .decode(&mut h.ctx, Message::text(frame))
            .await
    }

    #[tokio::test]
    async fn compact_report() {
        let mut h = harness();
        let positions = decode(&mut h, "ID123,37.7,-122.4,55,180,12]").await.expect("decode");
        assert_eq!(positions.len(), 1);
        let position = &positions[0];
        assert_eq!(position.device_id, 1);
        assert_eq!(position.protocol, "mobilogix");
        assert!(position.valid);
        assert_eq!(position.latitude, 37.7);
        assert_eq!(position.longitude, -122.4);
        assert_eq!(position.speed, 55.0);
        assert_eq!(position.course, 180.0);
        assert_eq!(position.altitude, 12.0);
        assert!(h.sessions.is_bound_to(1, h.channel.id()));
        assert!(h.memory.try_recv().is_none());
    }

    #[tokio::test]
    async fn full_report_is_acknowledged() {
        let mut h = harness();
        let frame = "\r\n[2024-05-01 08:00:00,T3,12,V1.2,201951132031,03,12.5,7,-33.5,151.25,100,90]";
        let positions = decode(&mut h, frame).await.expect("decode");
        let position = &positions[0];
        assert_eq!(position.device_id, 2);
        assert!(position.valid);
        assert_eq!(position.device_time_ms, 1_714_550_400_000);
        assert!((position.speed - 53.9957).abs() < 1e-9);
        assert_eq!(position.course, 90.0);
        assert_eq!(position.get("type"), Some(&AttributeValue::from("T3")));
        assert_eq!(position.get("ignition"), Some(&AttributeValue::Bool(true)));
        assert_eq!(position.get("motion"), Some(&AttributeValue::Bool(true)));
        assert_eq!(position.get("sat"), Some(&AttributeValue::I64(7)));
        assert_eq!(position.get("power"), Some(&AttributeValue::F64(12.5)));

        let ack = h.memory.try_recv().expect("ack");
        assert_eq!(&ack[..], b"[2024-05-01 08:00:00,S3]");
    }

    #[tokio::test]
    async fn no_satellites_means_invalid_fix() {
        let mut h = harness();
        let frame = "[2024-05-01 08:00:00,T2,1,V1.2,201951132031,00,12.1,0,0.0,0.0,0,0]";
        let positions = decode(&mut h, frame).await.expect("decode");
        assert!(!positions[0].valid);
        assert_eq!(positions[0].get("ignition"), Some(&AttributeValue::Bool(false)));
    }

    #[tokio::test]
    async fn login_binds_and_acknowledges() {
        let mut h = harness();
        let positions = decode(&mut h, "[2024-05-01 08:00:00,T1,1,V1.2,201951132031]")
            .await
            .expect("login");
        assert!(positions.is_empty());
        assert!(h.sessions.is_bound_to(2, h.channel.id()));
        let ack = h.memory.try_recv().expect("ack");
        assert_eq!(&ack[..], b"[2024-05-01 08:00:00,S1,1]");
    }

    #[tokio::test]
    async fn engine_stop_round_trip() {
        let mut h = harness();
        let device = Device::new(2, "201951132031", "full");
        let protocol = MobilogixProtocol::new();
        let sent = protocol
            .encode_command(&Command::new(2, CommandType::EngineStop), &device)
            .expect("encode");
        let sent = std::str::from_utf8(&sent).expect("utf8").to_string();
        assert!(sent.ends_with(",S41,201951132031,1]"));

        let time = &sent[1..20];
        let reply = format!("[{time},R41,201951132031,1]");
        let positions = decode(&mut h, &reply).await.expect("ack");
        let ack = &positions[0];
        assert!(!ack.valid);
        assert_eq!(ack.device_id, 2);
        assert_eq!(ack.get("type"), Some(&AttributeValue::from("R41")));
        assert_eq!(ack.get("command"), Some(&AttributeValue::from("engineStop")));
        assert_eq!(ack.get("result"), Some(&AttributeValue::from("1")));
        assert!(h.memory.try_recv().is_none());
    }

    #[tokio::test]
    async fn custom_result_keeps_commas() {
        let mut h = harness();
        let positions = decode(&mut h, "[2024-05-01 08:00:00,R30,201951132031,APN,ok]")
            .await
            .expect("ack");
        assert_eq!(positions[0].get("command"), Some(&AttributeValue::from("custom")));
        assert_eq!(positions[0].get("result"), Some(&AttributeValue::from("APN,ok")));
    }

    #[tokio::test]
    async fn garbled_frames_are_malformed() {
        let mut h = harness();
        for frame in [
            "]",
            "ID123,abc,-122.4,55]",
            "ID123,95.0,-122.4,55]",
            "ID123,37.7]",
            "[not-a-time,T3,1]",
            "[2024-05-01 08:00:00,X3,1,2]",
            "[2024-05-01 08:00:00,T3,1,V1,201951132031]",
            "[2024-05-01 08:00:00,T3,12,V1.2,201951132031,zz,12.5,7,1.0,1.0,0,0]",
        ] {
            let result = decode(&mut h, frame).await;
            assert!(
                matches!(result, Err(DecodeError::Malformed(_))),
                "frame {frame:?} gave {result:?}"
            );
        }
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn identity_errors() {
        let mut h = harness();
        assert!(matches!(
            decode(&mut h, "NOPE,1.0,2.0,3]").await,
            Err(DecodeError::UnknownDevice(_))
        ));
        assert!(matches!(
            decode(&mut h, "OFF1,1.0,2.0,3]").await,
            Err(DecodeError::DeviceDisabled(_))
        ));
        assert!(h.sessions.is_empty());
    }
}
