//! Session Lifecycle Scenarios
//!
//! Concurrent use of one session and what teardown does and does not release.

use dut_client::{DutError, Errno};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tests_scenarios::{config_for, spawn_sim_dut_server, tcp_bootstrap_with};

/// Test: Threads sharing one session each get their own round trips
#[test]
fn test_concurrent_calls_share_session() {
    let addr = spawn_sim_dut_server().unwrap();
    let (dut, reporter) = tcp_bootstrap_with(config_for(addr)).unwrap();
    let dut = Arc::new(dut);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let dut = Arc::clone(&dut);
            thread::spawn(move || {
                (0..10)
                    .map(|_| {
                        dut.create_bound_socket(
                            libc::SOCK_DGRAM,
                            0,
                            IpAddr::V4(Ipv4Addr::LOCALHOST),
                        )
                        .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut fds = Vec::new();
    let mut ports = Vec::new();
    for worker in workers {
        for (fd, port) in worker.join().unwrap() {
            fds.push(fd);
            ports.push(port);
        }
    }
    fds.sort_unstable();
    fds.dedup();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(fds.len(), 80);
    assert_eq!(ports.len(), 80);
    assert_eq!(reporter.fatal_count(), 0);

    if let Ok(dut) = Arc::try_unwrap(dut) {
        dut.tear_down();
    }
}

/// Test: Teardown releases the connection, not the DUT's descriptors
#[test]
fn test_teardown_leaves_remote_descriptors() {
    let addr = spawn_sim_dut_server().unwrap();

    let (first, _) = tcp_bootstrap_with(config_for(addr)).unwrap();
    let fd = first.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
    first.tear_down();

    let (second, reporter) = tcp_bootstrap_with(config_for(addr)).unwrap();
    second.close(fd).unwrap();
    let err = second.close(fd).unwrap_err();
    assert!(matches!(err, DutError::Posix { .. }));
    assert_eq!(err.errno().map(|errno| errno.raw()), Some(libc::EBADF));
    assert_eq!(reporter.fatal_count(), 1);
    second.tear_down();
}

/// Test: Large sends reach the DUT and an oversized one leaves the session usable
#[test]
fn test_large_send_keeps_session() {
    let addr = spawn_sim_dut_server().unwrap();
    let (dut, reporter) = tcp_bootstrap_with(config_for(addr)).unwrap();
    let timeout = Duration::from_secs(5);

    let sent = dut
        .send_with_errno(timeout, 3, &vec![7u8; 8 << 20], 0)
        .unwrap();
    assert_eq!(sent.ret, -1);
    assert_eq!(sent.errno, Errno(libc::EBADF));

    let err = dut
        .send_with_errno(timeout, 3, &vec![7u8; 16 << 20], 0)
        .unwrap_err();
    assert!(matches!(err, DutError::Transport { .. }), "unexpected error: {}", err);
    assert!(!err.is_deadline_exceeded());

    let fd = dut.socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
    assert!(fd >= 0);
    assert_eq!(reporter.fatal_count(), 1);
    dut.tear_down();
}
