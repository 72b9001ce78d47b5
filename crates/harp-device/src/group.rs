use crate::{ClockSynchronizer, DeviceError, DeviceMetrics, RegisterMap, RegisterType, Result};
use futures_util::Stream;
use harp_transport::HarpMessage;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

type GroupSender = mpsc::UnboundedSender<Result<HarpMessage>>;

/// Messages of a single register type, in arrival order.
///
/// Completes once the source stream ends. If the grouping fails, the group
/// yields the same error as its last item before completing.
#[derive(Debug)]
pub struct RegisterGroup {
    key: RegisterType,
    rx: mpsc::UnboundedReceiver<Result<HarpMessage>>,
}

impl RegisterGroup {
    pub fn key(&self) -> RegisterType {
        self.key
    }
}

impl Stream for RegisterGroup {
    type Item = Result<HarpMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Stream adapter splitting a message stream into one [`RegisterGroup`] per
/// register type.
///
/// A group is yielded the first time its register type is seen; later
/// messages of that type are routed into it. A message whose address is not
/// in the register map yields `Err(UnknownAddress)` on this stream and on every
/// open group, then ends them all.
pub struct GroupByRegister<S> {
    source: S,
    map: RegisterMap,
    groups: HashMap<RegisterType, GroupSender>,
    done: bool,
    metrics: Option<DeviceMetrics>,
}

impl<S> GroupByRegister<S>
where
    S: Stream<Item = HarpMessage> + Unpin,
{
    pub fn new(source: S, map: RegisterMap) -> Self {
        Self {
            source,
            map,
            groups: HashMap::new(),
            done: false,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn finish(&mut self) {
        self.done = true;
        // Dropping the senders completes every open group.
        self.groups.clear();
    }

    fn fail(&mut self, address: u8) {
        for tx in self.groups.values() {
            let _ = tx.send(Err(DeviceError::UnknownAddress(address)));
        }
        self.finish();
    }
}

impl<S> Stream for GroupByRegister<S>
where
    S: Stream<Item = HarpMessage> + Unpin,
{
    type Item = Result<RegisterGroup>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            let msg = match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    debug!(groups = this.groups.len(), "source completed");
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(msg)) => msg,
            };
            let key = match this.map.lookup(msg.address) {
                Ok(key) => key,
                Err(e) => {
                    warn!(address = msg.address, "message address not in register map");
                    if let Some(m) = &this.metrics {
                        m.unknown_addresses.inc();
                    }
                    this.fail(msg.address);
                    return Poll::Ready(Some(Err(e)));
                }
            };
            if let Some(m) = &this.metrics {
                m.messages_grouped.inc();
            }
            if let Some(tx) = this.groups.get(&key) {
                // A dropped group just stops receiving; routing continues.
                let _ = tx.send(Ok(msg));
                continue;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(Ok(msg));
            this.groups.insert(key, tx);
            if let Some(m) = &this.metrics {
                m.groups_opened.inc();
            }
            debug!(register = %key, "opened register group");
            return Poll::Ready(Some(Ok(RegisterGroup { key, rx })));
        }
    }
}

/// Group a ClockSynchronizer message stream by register type.
pub fn group_by_register<S>(source: S) -> GroupByRegister<S>
where
    S: Stream<Item = HarpMessage> + Unpin,
{
    GroupByRegister::new(source, ClockSynchronizer::register_map())
}

/// Batch form of [`group_by_register`]: groups come out in first-seen order.
pub fn group_messages<I>(map: &RegisterMap, messages: I) -> Result<Vec<(RegisterType, Vec<HarpMessage>)>>
where
    I: IntoIterator<Item = HarpMessage>,
{
    let mut index: HashMap<RegisterType, usize> = HashMap::new();
    let mut out: Vec<(RegisterType, Vec<HarpMessage>)> = Vec::new();
    for msg in messages {
        let key = map.lookup(msg.address)?;
        match index.get(&key) {
            Some(&i) => out[i].1.push(msg),
            None => {
                index.insert(key, out.len());
                out.push((key, vec![msg]));
            }
        }
    }
    Ok(out)
}
