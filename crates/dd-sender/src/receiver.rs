//! The sender's receiver thread (§4.4): accepts connections from upstream
//! builders and turns each incoming multipart message into a
//! [`dd_types::SubTimeFrame`], queued for the dispatch thread.
//!
//! Mirrors `StfReceiverThread`'s floodgate logging: per-TF size info is
//! logged only every [`LOG_EVERY_NTH_TF`]th TF rather than on every
//! message, so a steady-state run doesn't flood the log at DEBUG level.

use dd_transport::{Channel, TcpChannelListener};
use dd_types::SubTimeFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const LOG_EVERY_NTH_TF: u64 = 100;

/// Accepts connections on `listener` until `stop` is set, each on its own
/// thread; every successfully decoded STF is queued via `on_received`.
pub fn run(
    listener: TcpChannelListener,
    on_received: Arc<dyn Fn(SubTimeFrame) + Send + Sync>,
    stop: Arc<std::sync::atomic::AtomicBool>,
) {
    let counter = Arc::new(AtomicU64::new(0));
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok(channel) => {
                let on_received = on_received.clone();
                let counter = counter.clone();
                std::thread::spawn(move || receive_loop(channel, on_received, counter));
            }
            Err(e) => {
                log::warn!("failed to accept builder connection: {e}");
            }
        }
    }
}

fn receive_loop(mut channel: impl Channel, on_received: Arc<dyn Fn(SubTimeFrame) + Send + Sync>, counter: Arc<AtomicU64>) {
    loop {
        let parts = match channel.receive() {
            Ok(parts) => parts,
            Err(e) => {
                log::info!("builder connection closed: {e}");
                return;
            }
        };

        match dd_types::decode(&parts) {
            Ok(stf) => {
                let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
                if seen % LOG_EVERY_NTH_TF == 0 {
                    log::debug!(
                        "received tfid {} ({} bytes, {} hbframes), {} STFs received so far",
                        stf.id(),
                        stf.data_size(),
                        stf.n_hbf(),
                        seen
                    );
                }
                metrics::counter!("sender_stf_received_total").increment(1);
                on_received(stf);
            }
            Err(e) => {
                log::warn!("dropping malformed multipart message: {e}");
                metrics::counter!("sender_malformed_multipart_total").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_transport::TcpChannel;
    use std::sync::Mutex;

    #[test]
    fn decodes_one_message_and_invokes_callback() {
        let listener = TcpChannelListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_cb = received.clone();
        let on_received: Arc<dyn Fn(SubTimeFrame) + Send + Sync> =
            Arc::new(move |stf| received_cb.lock().unwrap().push(stf.id()));

        let mut stf = SubTimeFrame::new(dd_types::TimeFrameId(7), dd_types::ids::DataOrigin::Flp);
        stf.finalize();
        let parts = dd_types::encode(&stf).unwrap();

        let server = std::thread::spawn(move || {
            let channel = listener.accept().unwrap();
            let counter = Arc::new(AtomicU64::new(0));
            receive_loop(channel, on_received, counter);
        });

        let mut client = TcpChannel::connect(addr).unwrap();
        client.send(parts).unwrap();
        drop(client);

        server.join().unwrap();
        assert_eq!(received.lock().unwrap().as_slice(), &[dd_types::TimeFrameId(7)]);
    }
}
