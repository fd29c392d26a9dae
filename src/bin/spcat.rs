// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Command-line peer for exercising a scopemq socket from a shell, in the
//! shape of the teacher's would-be `nanocat` companion. Grounded on
//! `original_source/tools/{gridcat,options}.c` for the flag surface and
//! the four exit codes (0 success, 1 option usage, 2 payload I/O error,
//! 3 runtime error).

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;

use scopemq::{Error, Session, SocketType};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_FILE_IO: i32 = 2;
const EXIT_RUNTIME: i32 = 3;

#[derive(Parser)]
#[command(name = "spcat", about = "send and receive scopemq messages from the command line")]
struct Args {
    #[arg(long)]
    push: bool,
    #[arg(long)]
    pull: bool,
    #[arg(long = "pub")]
    pub_: bool,
    #[arg(long)]
    sub: bool,
    #[arg(long)]
    req: bool,
    #[arg(long)]
    rep: bool,
    #[arg(long)]
    bus: bool,
    #[arg(long)]
    pair: bool,
    #[arg(long)]
    surveyor: bool,
    #[arg(long)]
    respondent: bool,

    /// Repeatable.
    #[arg(long = "bind", value_name = "ADDR")]
    binds: Vec<String>,
    /// Repeatable.
    #[arg(long = "connect", value_name = "ADDR")]
    connects: Vec<String>,
    /// SUB only; repeatable, default is a single empty prefix (subscribe to everything).
    #[arg(long = "subscribe", value_name = "PREFIX")]
    subscribe: Vec<String>,

    #[arg(long = "send-timeout", value_name = "SEC")]
    send_timeout: Option<f64>,
    #[arg(long = "recv-timeout", value_name = "SEC")]
    recv_timeout: Option<f64>,
    /// Re-send the payload every SEC seconds instead of once.
    #[arg(long, value_name = "SEC")]
    interval: Option<f64>,
    /// Wait SEC seconds before the first send.
    #[arg(long, value_name = "SEC")]
    delay: Option<f64>,

    #[arg(long, value_name = "STRING")]
    data: Option<String>,
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    #[arg(long)]
    raw: bool,
    #[arg(long)]
    ascii: bool,
    #[arg(long)]
    quoted: bool,
    #[arg(long)]
    hex: bool,
    #[arg(long)]
    msgpack: bool,
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Raw,
    Ascii,
    Quoted,
    Hex,
    MsgPack,
}

fn main() {
    let args = Args::parse();
    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    env_logger::init();

    let socket_type = match selected_socket_type(&args) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("spcat: {}", msg);
            return EXIT_USAGE;
        }
    };
    let format = match selected_format(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("spcat: {}", msg);
            return EXIT_USAGE;
        }
    };
    let payload = match load_payload(&args) {
        Ok(p) => p,
        Err(Outcome::Usage(msg)) => {
            eprintln!("spcat: {}", msg);
            return EXIT_USAGE;
        }
        Err(Outcome::FileIo(msg)) => {
            eprintln!("spcat: {}", msg);
            return EXIT_FILE_IO;
        }
    };

    let session = Session::new();
    let socket = match session.create_socket(socket_type) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("spcat: {}", e);
            return EXIT_RUNTIME;
        }
    };

    for addr in &args.binds {
        if let Err(e) = socket.bind(addr) {
            eprintln!("spcat: bind {}: {}", addr, e);
            return EXIT_RUNTIME;
        }
    }
    for addr in &args.connects {
        if let Err(e) = socket.connect(addr) {
            eprintln!("spcat: connect {}: {}", addr, e);
            return EXIT_RUNTIME;
        }
    }

    if socket_type == SocketType::Sub {
        if args.subscribe.is_empty() {
            if let Err(e) = socket.set_raw_option("subscribe", b"") {
                eprintln!("spcat: subscribe: {}", e);
                return EXIT_RUNTIME;
            }
        } else {
            for prefix in &args.subscribe {
                if let Err(e) = socket.set_raw_option("subscribe", prefix.as_bytes()) {
                    eprintln!("spcat: subscribe {}: {}", prefix, e);
                    return EXIT_RUNTIME;
                }
            }
        }
    }

    if let Some(sec) = args.send_timeout {
        let _ = socket.set_send_timeout(Duration::from_secs_f64(sec));
    }
    if let Some(sec) = args.recv_timeout {
        let _ = socket.set_recv_timeout(Duration::from_secs_f64(sec));
    }

    let can_send = matches!(
        socket_type,
        SocketType::Push | SocketType::Pub | SocketType::Req | SocketType::Surveyor | SocketType::Bus | SocketType::Pair
    );
    let can_recv = matches!(
        socket_type,
        SocketType::Pull
            | SocketType::Sub
            | SocketType::Rep
            | SocketType::Respondent
            | SocketType::Bus
            | SocketType::Pair
            | SocketType::Req
            | SocketType::Surveyor
    );
    let waits_for_reply = matches!(socket_type, SocketType::Req | SocketType::Surveyor);
    let echoes_payload = matches!(socket_type, SocketType::Rep | SocketType::Respondent) && payload.is_some();

    if can_send {
        match payload.clone() {
            Some(body) => {
                if let Some(sec) = args.delay {
                    thread::sleep(Duration::from_secs_f64(sec));
                }
                loop {
                    if let Err(e) = socket.send(body.clone()) {
                        eprintln!("spcat: send: {}", e);
                        return EXIT_RUNTIME;
                    }
                    if waits_for_reply {
                        match drain_replies(&socket, format, socket_type) {
                            Ok(()) => {}
                            Err(code) => return code,
                        }
                    }
                    match args.interval {
                        Some(sec) => thread::sleep(Duration::from_secs_f64(sec)),
                        None => break,
                    }
                }
                if !can_recv || waits_for_reply {
                    return EXIT_OK;
                }
            }
            None if !can_recv => {
                eprintln!("spcat: {} requires --data or --file", socket_name(socket_type));
                return EXIT_USAGE;
            }
            None => {}
        }
    }

    if can_recv {
        loop {
            match socket.recv() {
                Ok(body) => {
                    print_message(&body, format);
                    if echoes_payload {
                        if let Err(e) = socket.send(payload.clone().unwrap()) {
                            eprintln!("spcat: send: {}", e);
                            return EXIT_RUNTIME;
                        }
                    }
                }
                Err(Error::TimedOut) => continue,
                Err(e) => {
                    eprintln!("spcat: recv: {}", e);
                    return EXIT_RUNTIME;
                }
            }
        }
    }

    EXIT_OK
}

/// REQ gets exactly one reply per request; SURVEYOR keeps collecting
/// answers until its deadline reports `Fsm`/`TimedOut` (spec.md §G.8).
fn drain_replies(socket: &scopemq::Socket, format: OutputFormat, socket_type: SocketType) -> Result<(), i32> {
    loop {
        match socket.recv() {
            Ok(body) => {
                print_message(&body, format);
                if socket_type == SocketType::Req {
                    return Ok(());
                }
            }
            Err(Error::TimedOut) | Err(Error::Fsm) => return Ok(()),
            Err(e) => {
                eprintln!("spcat: recv: {}", e);
                return Err(EXIT_RUNTIME);
            }
        }
    }
}

fn selected_socket_type(args: &Args) -> Result<SocketType, &'static str> {
    let chosen: Vec<SocketType> = [
        (args.push, SocketType::Push),
        (args.pull, SocketType::Pull),
        (args.pub_, SocketType::Pub),
        (args.sub, SocketType::Sub),
        (args.req, SocketType::Req),
        (args.rep, SocketType::Rep),
        (args.bus, SocketType::Bus),
        (args.pair, SocketType::Pair),
        (args.surveyor, SocketType::Surveyor),
        (args.respondent, SocketType::Respondent),
    ]
    .into_iter()
    .filter_map(|(set, ty)| set.then_some(ty))
    .collect();

    match chosen.len() {
        0 => Err("no socket type given, pick one of --push/--pull/--pub/--sub/--req/--rep/--bus/--pair/--surveyor/--respondent"),
        1 => Ok(chosen[0]),
        _ => Err("only one socket type may be selected"),
    }
}

fn selected_format(args: &Args) -> Result<OutputFormat, &'static str> {
    let chosen: Vec<OutputFormat> = [
        (args.raw, OutputFormat::Raw),
        (args.ascii, OutputFormat::Ascii),
        (args.quoted, OutputFormat::Quoted),
        (args.hex, OutputFormat::Hex),
        (args.msgpack, OutputFormat::MsgPack),
    ]
    .into_iter()
    .filter_map(|(set, fmt)| set.then_some(fmt))
    .collect();

    match chosen.len() {
        0 => Ok(OutputFormat::Raw),
        1 => Ok(chosen[0]),
        _ => Err("only one output format may be selected"),
    }
}

enum Outcome {
    Usage(String),
    FileIo(String),
}

fn load_payload(args: &Args) -> Result<Option<Vec<u8>>, Outcome> {
    match (&args.data, &args.file) {
        (Some(_), Some(_)) => Err(Outcome::Usage("--data and --file are mutually exclusive".to_string())),
        (Some(s), None) => Ok(Some(s.clone().into_bytes())),
        (None, Some(path)) => fs::read(path)
            .map(Some)
            .map_err(|e| Outcome::FileIo(format!("{}: {}", path.display(), e))),
        (None, None) => Ok(None),
    }
}

fn socket_name(socket_type: SocketType) -> &'static str {
    match socket_type {
        SocketType::Pair => "PAIR",
        SocketType::Pub => "PUB",
        SocketType::Sub => "SUB",
        SocketType::Req => "REQ",
        SocketType::Rep => "REP",
        SocketType::Push => "PUSH",
        SocketType::Pull => "PULL",
        SocketType::Surveyor => "SURVEYOR",
        SocketType::Respondent => "RESPONDENT",
        SocketType::Bus => "BUS",
    }
}

fn print_message(body: &[u8], format: OutputFormat) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Raw => {
            let _ = out.write_all(body);
            let _ = out.write_all(b"\n");
        }
        OutputFormat::Ascii => {
            let rendered: String = body
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            println!("{}", rendered);
        }
        OutputFormat::Quoted => {
            print!("\"");
            for &b in body {
                match b {
                    b'"' => print!("\\\""),
                    b'\\' => print!("\\\\"),
                    0x20..=0x7e => print!("{}", b as char),
                    _ => print!("\\x{:02x}", b),
                }
            }
            println!("\"");
        }
        OutputFormat::Hex => {
            let rendered: String = body.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{}", rendered);
        }
        OutputFormat::MsgPack => {
            let _ = out.write_all(&msgpack_bin(body));
        }
    }
}

/// Wraps `body` in a msgpack `bin 8`/`bin 16`/`bin 32` header, per the
/// msgpack spec's binary family — the closest this tool gets to depending
/// on a full msgpack crate for what is, here, a one-shot output encoding.
fn msgpack_bin(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    let len = body.len();
    if len <= u8::MAX as usize {
        out.push(0xc4);
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(0xc5);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0xc6);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(body);
    out
}
