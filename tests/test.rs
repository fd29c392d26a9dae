// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::thread;
use std::time::{Duration, Instant};

use scopemq::{Error, Session, SocketType};

#[test]
fn pair_over_inproc_is_byte_for_byte() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let server = session.create_socket(SocketType::Pair).unwrap();
    let client = session.create_socket(SocketType::Pair).unwrap();

    server.bind("inproc://pair-bytes").unwrap();
    client.connect("inproc://pair-bytes").unwrap();

    client.send(b"ABC".to_vec()).unwrap();
    assert_eq!(server.recv().unwrap(), b"ABC");

    server.send(b"XYZ".to_vec()).unwrap();
    assert_eq!(client.recv().unwrap(), b"XYZ");
}

#[test]
fn req_rep_round_trip_matches_ids() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let rep = session.create_socket(SocketType::Rep).unwrap();
    let req = session.create_socket(SocketType::Req).unwrap();

    rep.bind("inproc://req-rep").unwrap();
    req.connect("inproc://req-rep").unwrap();

    req.send(b"ping".to_vec()).unwrap();
    let request = rep.recv().unwrap();
    assert_eq!(request, b"ping");

    rep.send(request).unwrap();
    let reply = req.recv().unwrap();
    assert_eq!(reply, b"ping");
}

#[test]
fn sub_filters_by_subscribed_prefix() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let pub_socket = session.create_socket(SocketType::Pub).unwrap();
    let sub_a = session.create_socket(SocketType::Sub).unwrap();
    let sub_b = session.create_socket(SocketType::Sub).unwrap();

    pub_socket.bind("inproc://pubsub-filter").unwrap();
    sub_a.connect("inproc://pubsub-filter").unwrap();
    sub_b.connect("inproc://pubsub-filter").unwrap();

    sub_a.set_raw_option("subscribe", b"A").unwrap();
    sub_b.set_raw_option("subscribe", b"B").unwrap();
    sub_a.set_recv_timeout(Duration::from_millis(500)).unwrap();
    sub_b.set_recv_timeout(Duration::from_millis(500)).unwrap();

    // Give the backend tick a moment to finish both handshakes before
    // publishing, since PUB has no notion of a slow-joiner guarantee.
    thread::sleep(Duration::from_millis(50));

    pub_socket.send(b"Apple".to_vec()).unwrap();
    pub_socket.send(b"Banana".to_vec()).unwrap();

    assert_eq!(sub_a.recv().unwrap(), b"Apple");
    assert_eq!(sub_b.recv().unwrap(), b"Banana");
}

#[test]
fn surveyor_deadline_times_out_then_resets_on_next_send() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let surveyor = session.create_socket(SocketType::Surveyor).unwrap();
    let respondent = session.create_socket(SocketType::Respondent).unwrap();

    surveyor.bind("inproc://survey-deadline").unwrap();
    respondent.connect("inproc://survey-deadline").unwrap();
    surveyor.set_deadline(Duration::from_millis(100)).unwrap();

    thread::sleep(Duration::from_millis(50));
    surveyor.send(b"?".to_vec()).unwrap();

    // The respondent stays silent; the first recv should block roughly
    // up to the deadline and then report a timeout, not an immediate error.
    let started = Instant::now();
    let err = surveyor.recv().unwrap_err();
    assert!(matches!(err, Error::TimedOut));
    assert!(started.elapsed() >= Duration::from_millis(90));

    // A second recv with no new survey in progress reports Fsm.
    let err = surveyor.recv().unwrap_err();
    assert!(matches!(err, Error::Fsm));

    // Starting a fresh survey clears the old timed-out state.
    surveyor.send(b"?".to_vec()).unwrap();
    surveyor.set_recv_timeout(Duration::from_millis(50)).unwrap();
    let err = surveyor.recv().unwrap_err();
    assert!(matches!(err, Error::TimedOut));
}

#[test]
fn reconnect_backoff_follows_doubling_schedule() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull).unwrap();

    // Nothing listens on this port; every connect attempt fails and the
    // endpoint should retry on a doubling-then-capped schedule.
    pull.set_option(scopemq::SocketOption::ReconnectIvl(Duration::from_millis(20))).unwrap();
    pull.set_option(scopemq::SocketOption::ReconnectIvlMax(Duration::from_millis(80))).unwrap();
    pull.connect("tcp://127.0.0.1:1").unwrap();

    // Give it a handful of backoff cycles to run; we can't observe the
    // internal retry timestamps from outside, but the socket must stay
    // usable (no panics, no premature BadHandle) across several of them.
    thread::sleep(Duration::from_millis(300));
    pull.set_recv_timeout(Duration::from_millis(10)).unwrap();
    assert!(pull.recv().is_err());
}

#[test]
fn closing_a_socket_unblocks_a_pending_recv() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull).unwrap();
    pull.bind("inproc://graceful-shutdown").unwrap();

    let blocked = pull.clone();
    let handle = thread::spawn(move || {
        let started = Instant::now();
        let err = blocked.recv().unwrap_err();
        (err, started.elapsed())
    });

    thread::sleep(Duration::from_millis(50));
    pull.close();

    let (err, elapsed) = handle.join().unwrap();
    assert!(matches!(err, Error::BadHandle));
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn session_close_all_unblocks_every_socket() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let a = session.create_socket(SocketType::Pull).unwrap();
    let b = session.create_socket(SocketType::Pull).unwrap();
    a.bind("inproc://close-all-a").unwrap();
    b.bind("inproc://close-all-b").unwrap();

    let a2 = a.clone();
    let b2 = b.clone();
    let ha = thread::spawn(move || a2.recv());
    let hb = thread::spawn(move || b2.recv());

    thread::sleep(Duration::from_millis(50));
    session.close_all();

    assert!(matches!(ha.join().unwrap().unwrap_err(), Error::Terminated));
    assert!(matches!(hb.join().unwrap().unwrap_err(), Error::Terminated));
    assert!(matches!(session.create_socket(SocketType::Pull), Err(Error::Terminated)));
}

#[test]
fn push_pull_over_tcp_connected_to_bound() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let pull = session.create_socket(SocketType::Pull).unwrap();
    let push = session.create_socket(SocketType::Push).unwrap();

    pull.bind("tcp://127.0.0.1:17171").unwrap();
    push.connect("tcp://127.0.0.1:17171").unwrap();

    push.send(vec![65, 66, 67]).unwrap();
    assert_eq!(pull.recv().unwrap(), vec![65, 66, 67]);
}

#[test]
fn bus_fans_out_to_every_other_member_but_not_back_to_sender() {
    let _ = env_logger::try_init();
    let session = Session::new();
    let a = session.create_socket(SocketType::Bus).unwrap();
    let b = session.create_socket(SocketType::Bus).unwrap();
    let c = session.create_socket(SocketType::Bus).unwrap();

    a.bind("inproc://bus-hub").unwrap();
    b.connect("inproc://bus-hub").unwrap();
    c.connect("inproc://bus-hub").unwrap();
    thread::sleep(Duration::from_millis(50));

    a.send(b"hello".to_vec()).unwrap();
    assert_eq!(b.recv().unwrap(), b"hello");
    assert_eq!(c.recv().unwrap(), b"hello");
    a.set_recv_timeout(Duration::from_millis(50)).unwrap();
    assert!(a.recv().is_err());
}
