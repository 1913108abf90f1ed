use std::net::UdpSocket;
use std::time::Duration;

use trove_hal::{LinkEvent, LinkInterface, Scheduler, Sensor};
use trove_linux::{wait_readable, IntervalTimer, SimulatedSensor, UdpLink, ACK_BYTE, DISCONNECT_BYTE};

/// Poll until the link reports something (or give up after ~1s).
fn next_event(link: &mut UdpLink) -> Option<LinkEvent> {
    for _ in 0..100 {
        match link.poll_event() {
            Ok(ev) => return Some(ev),
            Err(nb::Error::WouldBlock) => { wait_readable(link.fd(), 10); }
            Err(nb::Error::Other(_)) => return None,
        }
    }
    None
}

fn hub() -> UdpSocket {
    let hub = UdpSocket::bind("127.0.0.1:0").unwrap();
    hub.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
    hub
}

#[test]
fn test_link_credit_window() {
    let hub = hub();
    let peer = hub.local_addr().unwrap().to_string();
    let mut link = UdpLink::new("127.0.0.1:0", Some(&peer), 20, 2, Duration::from_secs(5)).unwrap();

    // 1. Window of two
    assert_eq!(link.available_slots(), 2);
    assert_eq!(link.send_chunk(b"abc").unwrap(), 3);
    assert_eq!(link.send_chunk(b"def").unwrap(), 3);
    assert!(matches!(link.send_chunk(b"ghi"), Err(nb::Error::WouldBlock)));

    let mut buf = [0u8; 64];
    let (n, node) = hub.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"abc");

    // 2. Ack reopens one slot
    hub.send_to(&[ACK_BYTE], node).unwrap();
    assert_eq!(next_event(&mut link), Some(LinkEvent::ChunkDelivered));
    assert_eq!(link.available_slots(), 1);

    // 3. Oversized chunk rejected outright
    assert!(matches!(link.send_chunk(&[0u8; 21]), Err(nb::Error::Other(_))));
}

#[test]
fn test_link_commands_and_disconnect() {
    let hub = hub();
    let mut link = UdpLink::new("127.0.0.1:0", None, 20, 4, Duration::from_secs(5)).unwrap();
    assert!(!link.is_connected());
    assert_eq!(link.available_slots(), 0);

    let node = link.local_addr().unwrap();
    hub.send_to(b"T", node).unwrap();
    assert_eq!(next_event(&mut link), Some(LinkEvent::Command(b'T')));
    assert!(link.is_connected());
    assert_eq!(link.peer(), Some(hub.local_addr().unwrap()));

    hub.send_to(&[DISCONNECT_BYTE], node).unwrap();
    assert_eq!(next_event(&mut link), Some(LinkEvent::Lost));
    assert!(!link.is_connected());
}

#[test]
fn test_link_ack_timeout() {
    let hub = hub();
    let peer = hub.local_addr().unwrap().to_string();
    let mut link = UdpLink::new("127.0.0.1:0", Some(&peer), 20, 4, Duration::from_millis(20)).unwrap();

    link.send_chunk(b"x").unwrap();
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(link.poll_event(), Ok(LinkEvent::Lost));
    assert_eq!(link.available_slots(), 0);
}

#[test]
fn test_interval_timer() {
    let mut timer = IntervalTimer::new();
    assert!(!timer.due(0));

    timer.every(100);
    assert!(!timer.due(1_000)); // arms the baseline
    assert!(!timer.due(1_050));
    assert!(timer.due(1_100));
    assert!(!timer.due(1_150));

    // Late poll fires once, no backlog
    assert!(timer.due(5_000));
    assert!(!timer.due(5_050));
    assert!(timer.due(5_100));

    timer.cancel();
    assert!(!timer.is_armed());
    assert!(!timer.due(10_000));
}

#[test]
fn test_sensor_is_two_phase() {
    let mut sensor = SimulatedSensor::seeded(20, 7);
    assert!(sensor.read_result().is_err(), "Read before conversion must fail");

    for _ in 0..50 {
        sensor.start_acquisition().unwrap();
        let t = sensor.read_result().unwrap();
        assert!((-30..=70).contains(&(t as i16)));
        assert!(sensor.read_result().is_err());
    }
}
