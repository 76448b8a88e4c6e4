//! CV programming against a simulated command station

mod common;

use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_unpaged_round_trip() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone());

    for id in 1..=256u16 {
        let value = (id % 251) as u8;
        z21.write_cv(id, value, 0).await.unwrap();
        assert_eq!(z21.read_cv(id, 0).await.unwrap(), value, "CV{id}");
    }
    // one send per write and per read, no index register traffic
    assert_eq!(station.sent().len(), 512);
    assert_eq!(station.pending_replies(), 0);
}

#[tokio::test]
async fn test_paged_round_trip_restores_index_register() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone());

    z21.write_cv(259, 100, 2).await.unwrap();
    assert_eq!(station.index_register(), 0);
    assert_eq!(station.cv(2, 259), Some(100));

    assert_eq!(z21.read_cv(259, 2).await.unwrap(), 100);
    assert_eq!(station.index_register(), 0);

    assert_eq!(
        station.cv_writes(),
        vec![(31, 16), (32, 2), (259, 100), (32, 0), (31, 16), (32, 2), (32, 0)]
    );
    assert_eq!(station.pending_replies(), 0);
}

#[tokio::test]
async fn test_pages_are_independent() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone());

    z21.write_cv(300, 11, 2).await.unwrap();
    z21.write_cv(300, 22, 3).await.unwrap();
    z21.write_cv(300, 33, 0).await.unwrap();

    assert_eq!(z21.read_cv(300, 2).await.unwrap(), 11);
    assert_eq!(z21.read_cv(300, 3).await.unwrap(), 22);
    assert_eq!(z21.read_cv(300, 0).await.unwrap(), 33);
}

#[tokio::test]
async fn test_high_cvs_honour_the_page() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone());

    station.set_cv(3, 600, 7);
    station.set_cv(0, 600, 99);
    assert_eq!(z21.read_cv(600, 3).await.unwrap(), 7);
    assert_eq!(z21.read_cv(600, 0).await.unwrap(), 99);
    z21.write_cv(1024, 5, 16).await.unwrap();
    assert_eq!(station.cv(16, 1024), Some(5));
    assert_eq!(station.index_register(), 0);
    assert_eq!(station.cv_writes(), vec![(31, 16), (32, 3), (32, 0), (31, 16), (32, 16), (1024, 5), (32, 0)]);
}

#[tokio::test]
async fn test_concurrent_paged_writes_do_not_interleave() {
    let station = SimulatedStation::new();
    let z21 = Arc::new(Z21::new(station.clone()));

    let tasks: Vec<_> = (1..=8u8)
        .map(|page| {
            let z21 = Arc::clone(&z21);
            tokio::spawn(async move { z21.write_cv(259, page * 10, page).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for page in 1..=8u8 {
        assert_eq!(station.cv(page, 259), Some(page * 10));
    }
    assert_eq!(station.index_register(), 0);
}

#[tokio::test]
async fn test_nack_is_an_error_and_page_is_restored() {
    let station = SimulatedStation::new();
    station.nack(259);
    let z21 = Z21::new(station.clone());

    let err = z21.read_cv(259, 4).await.unwrap_err();
    assert!(matches!(err, Error::CvNack { cv: 259 }));
    assert_eq!(station.index_register(), 0);

    let err = z21.write_cv(259, 1, 4).await.unwrap_err();
    assert!(matches!(err, Error::CvNack { cv: 259 }));
    assert_eq!(station.index_register(), 0);
    assert_eq!(station.pending_replies(), 0);
}

fn cv_result(cv: u16, value: u8) -> Vec<u8> {
    let [msb, lsb] = (cv - 1).to_be_bytes();
    let mut datagram = vec![0x0A, 0x00, 0x40, 0x00, 0x64, 0x14, msb, lsb, value];
    datagram.push(xor_checksum(&datagram[4..]));
    datagram
}

#[tokio::test]
async fn test_failed_restore_is_reported() {
    let mock = MockTransport::new();
    mock.push_reply(&cv_result(31, 16));
    mock.push_reply(&cv_result(32, 5));
    mock.push_reply(&cv_result(259, 42));
    // nothing acknowledges the CV32 restore
    let z21 = Z21::new(mock.clone());

    let err = z21.read_cv(259, 5).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    let sent = mock.sent_data();
    assert_eq!(sent.len(), 4);
    assert_eq!(&sent[3][6..9], &[0x00, 0x1F, 0x00]);
}

#[tokio::test]
async fn test_registers_validate_before_sending() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone()).with_decoder(DecoderModel::LokSound5);

    assert!(matches!(
        z21.write_register(Register::StartVoltage, 0).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        z21.write_register(Register::MotorPwmFrequency, 51).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(station.sent().is_empty());

    z21.write_register(Register::StartVoltage, 5).await.unwrap();
    assert_eq!(z21.read_register(Register::StartVoltage).await.unwrap(), 5);
    z21.write_register(Register::BrakeVolume, 64).await.unwrap();
    assert_eq!(station.cv(2, 259), Some(64));
    assert_eq!(z21.read_register(Register::BrakeVolume).await.unwrap(), 64);
}

#[tokio::test]
async fn test_brake_sound_and_reset() {
    let station = SimulatedStation::new();
    let z21 = Z21::new(station.clone()).with_decoder(DecoderModel::LokSound5);

    z21.set_brake_sound_on().await.unwrap();
    assert_eq!(station.cv(0, 4), Some(21));
    assert_eq!(station.cv(0, 64), Some(60));
    assert_eq!(station.cv(0, 65), Some(10));
    assert_eq!(station.cv(2, 259), Some(100));
    assert_eq!(station.index_register(), 0);

    z21.reset_decoder().await.unwrap();
    assert_eq!(station.cv_writes().last(), Some(&(8, 8)));
}
