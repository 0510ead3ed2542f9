//! Minimal rendezvous: one tag, a few receiver threads on distinct levels,
//! one sender delivering a payload to each.

use std::sync::Arc;
use std::thread;

use tagmux::{Config, CtlCommand, Permission, ReceiveOutcome, SendOutcome, TagCommand, TagExchange};

const EUID: u32 = 1000;
const WORKERS: usize = 4;

fn main() {
    let exchange = Arc::new(TagExchange::new(Config::default()));
    let descriptor = exchange
        .tag_get(42, TagCommand::Create, Permission::Any, EUID)
        .expect("create tag");

    let receivers: Vec<_> = (0..WORKERS)
        .map(|level| {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || {
                let mut buf = [0u8; 32];
                match exchange
                    .tag_receive(descriptor, level, &mut buf, EUID)
                    .expect("receive")
                {
                    ReceiveOutcome::Delivered(n) => {
                        println!(
                            "level {level}: got {:?}",
                            String::from_utf8_lossy(&buf[..n])
                        );
                    }
                    ReceiveOutcome::Woken => println!("level {level}: woken without payload"),
                }
            })
        })
        .collect();

    for level in 0..WORKERS {
        let payload = format!("hello level {level}");
        // Sends are best-effort: retry until the worker is registered.
        while exchange
            .tag_send(descriptor, level, payload.as_bytes(), EUID)
            .expect("send")
            == SendOutcome::Discarded
        {
            thread::yield_now();
        }
    }

    for receiver in receivers {
        receiver.join().expect("worker panicked");
    }

    print!("{}", exchange.status_report());

    exchange
        .tag_ctl(descriptor, CtlCommand::Delete, EUID)
        .expect("delete tag");
}
