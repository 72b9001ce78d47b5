use futures_util::{stream, StreamExt};
use harp_device::{
    decode_register, get_metadata, group_by_register, group_messages, load_metadata_dir,
    load_metadata_file, ClockSynchronizer, DeviceError, MetricsHub, RegisterType, RegisterValue, METADATA,
};
use harp_transport::{DeviceTimestamp, HarpBus, HarpMessage, MessageType, MockBus, PayloadType};
use std::fs;

fn seeded_bus() -> MockBus {
    let mut bus = MockBus::open("mock0").unwrap();
    bus.set_register(
        0,
        PayloadType::U16,
        ClockSynchronizer::WHO_AM_I.to_le_bytes().to_vec(),
    );
    bus.set_register(8, PayloadType::U32, 5u32.to_le_bytes().to_vec());
    bus.set_register(14, PayloadType::U8, vec![0x12]);
    bus
}

#[test]
fn metadata_matches_embedded_file() {
    let on_disk = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/device.yml")).unwrap();
    assert_eq!(ClockSynchronizer::metadata(), on_disk);
    assert_eq!(METADATA, on_disk);
}

#[tokio::test]
async fn metadata_stream_is_single_emission() {
    let mut s = get_metadata();
    assert_eq!(s.next().await, Some(METADATA));
    assert_eq!(s.next().await, None);
}

#[tokio::test]
async fn groups_replies_from_mock_device() {
    let mut bus = seeded_bus();
    for addr in [0u8, 8, 0, 14, 8] {
        let ptype = ClockSynchronizer::register_map().lookup(addr).unwrap().payload_type();
        bus.send(&HarpMessage::read(addr, ptype)).unwrap();
    }
    let mut replies = Vec::new();
    while let Ok(msg) = bus.recv(Some(10)) {
        replies.push(msg);
    }
    assert_eq!(replies.len(), 5);

    let hub = MetricsHub::new().unwrap();
    let grouped: Vec<_> = group_by_register(stream::iter(replies))
        .with_metrics(hub.dev.clone())
        .collect()
        .await;

    let mut summary = Vec::new();
    for g in grouped {
        let g = g.unwrap();
        let key = g.key();
        let n = g.count().await;
        summary.push((key, n));
    }
    assert_eq!(
        summary,
        vec![
            (RegisterType::WhoAmI, 2),
            (RegisterType::TimestampSeconds, 2),
            (RegisterType::ClockConfiguration, 1),
        ]
    );
    assert_eq!(hub.dev.messages_grouped.get(), 5);
    assert_eq!(hub.dev.groups_opened.get(), 3);
}

#[tokio::test]
async fn unknown_address_is_not_dropped() {
    let hub = MetricsHub::new().unwrap();
    let source = stream::iter(vec![
        HarpMessage::new(MessageType::Event, 18, PayloadType::U16, vec![1, 0]),
        HarpMessage::new(MessageType::Event, 33, PayloadType::U8, vec![1]),
    ]);
    let results: Vec<_> = group_by_register(source)
        .with_metrics(hub.dev.clone())
        .collect()
        .await;
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(DeviceError::UnknownAddress(33))));
    assert_eq!(hub.dev.unknown_addresses.get(), 1);
}

#[test]
fn decoded_record_serializes() {
    let msg = HarpMessage::new(
        MessageType::Event,
        8,
        PayloadType::U32,
        7u32.to_le_bytes().to_vec(),
    )
    .with_timestamp(DeviceTimestamp {
        seconds: 7,
        ticks: 0,
    });
    let rec = decode_register(&ClockSynchronizer::register_map(), &msg).unwrap();
    assert_eq!(rec.value, RegisterValue::U32(7));
    let json = serde_json::to_value(&rec).unwrap();
    assert_eq!(json["register"], "TimestampSeconds");
    assert_eq!(json["value"], 7);
    assert_eq!(json["ts"], 7.0);
}

#[test]
fn loads_metadata_from_directory() {
    let dir = std::env::temp_dir().join(format!("harp-device-meta-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("clock.yml"), METADATA).unwrap();
    fs::write(
        dir.join("other.yaml"),
        "device: Behavior\nwhoAmI: 1216\nfirmwareVersion: \"2.1\"\nhardwareTargets: \"2.0\"\nregisters:\n  DigitalInputState:\n    address: 32\n    type: U8\n    access: [Read, Event]\n",
    )
    .unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let reg = load_metadata_dir(&dir).unwrap();
    assert_eq!(reg.devices.len(), 2);
    assert_eq!(
        reg.by_who_am_i(ClockSynchronizer::WHO_AM_I).unwrap().device,
        "ClockSynchronizer"
    );
    let behavior = &reg.devices["Behavior"];
    assert_eq!(
        behavior.registers["DigitalInputState"].access.modes(),
        vec!["Read", "Event"]
    );

    fs::write(
        dir.join("bad.yml"),
        "device: Bad\nwhoAmI: 1\nfirmwareVersion: \"0.1\"\nhardwareTargets: \"1.0\"\nregisters:\n  Clash:\n    address: 8\n    type: U8\n    access: Read\n",
    )
    .unwrap();
    assert!(load_metadata_file(dir.join("bad.yml")).is_err());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn loads_metadata_with_plain_and_detailed_mask_bits() {
    let path = std::env::temp_dir().join(format!("harp-device-masks-{}.yml", std::process::id()));
    fs::write(
        &path,
        "device: Behavior\n\
         whoAmI: 1216\n\
         firmwareVersion: \"2.1\"\n\
         hardwareTargets: \"2.0\"\n\
         bitMasks:\n\
         \x20 DigitalInputs:\n\
         \x20   bits:\n\
         \x20     DI0: 0x1\n\
         \x20     DI1: { value: 0x2, description: Second input }\n\
         groupMasks:\n\
         \x20 MimicOutput:\n\
         \x20   values:\n\
         \x20     None: 0\n",
    )
    .unwrap();

    let desc = load_metadata_file(&path).unwrap();
    let bits = &desc.bit_masks["DigitalInputs"].bits;
    assert_eq!(bits["DI0"].value(), 1);
    assert_eq!(bits["DI1"].value(), 2);
    assert_eq!(desc.group_masks["MimicOutput"].values["None"].value(), 0);

    fs::remove_file(&path).ok();
}

#[test]
fn device_link_feeds_grouping() {
    let mut bus = seeded_bus();
    bus.push(HarpMessage::new(
        MessageType::Event,
        18,
        PayloadType::U16,
        vec![2, 0],
    ));
    let mut link = ClockSynchronizer::open_with(bus, 10).unwrap();
    link.read_register(RegisterType::TimestampSeconds).unwrap();
    let received: Vec<_> = link.collect::<Result<_, _>>().unwrap();
    let groups = group_messages(&ClockSynchronizer::register_map(), received).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].0, RegisterType::Heartbeat);

    let mut other = MockBus::open("mock1").unwrap();
    other.set_register(0, PayloadType::U16, 1216u16.to_le_bytes().to_vec());
    assert!(matches!(
        ClockSynchronizer::open(other),
        Err(DeviceError::IdentityMismatch { actual: 1216, .. })
    ));
}
