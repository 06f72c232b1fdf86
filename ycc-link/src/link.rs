//! Per-processor link: the pool table and the named channels shared by the
//! host and one accelerator

use crate::buffer_pool::PoolTable;
use crate::channel::{Endpoint, Wire};
use crate::error::LinkError;
use crate::types::{ChannelAttrs, ChannelId, Direction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Link {
    processor: u8,
    pools: PoolTable,
    channels: Mutex<HashMap<ChannelId, Arc<Wire>>>,
}

impl Link {
    pub fn new(processor: u8) -> Self {
        Link {
            processor,
            pools: PoolTable::new(),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn processor(&self) -> u8 {
        self.processor
    }

    pub fn pools(&self) -> &PoolTable {
        &self.pools
    }

    /// Create a channel and take the end facing `direction`
    pub fn create_channel(
        &self,
        id: ChannelId,
        direction: Direction,
        attrs: ChannelAttrs,
    ) -> Result<Endpoint, LinkError> {
        let mut channels = self.channels.lock();
        if channels.contains_key(&id) {
            return Err(LinkError::ChannelExists(id));
        }

        let wire = Wire::new(id, attrs);
        let endpoint = wire.attach(direction)?;
        channels.insert(id, wire);

        log::debug!(
            "proc {}: {} created ({}, {:?})",
            self.processor,
            id,
            direction,
            attrs
        );
        Ok(endpoint)
    }

    /// Take the remaining end of a channel created by the peer
    pub fn open_channel(&self, id: ChannelId, direction: Direction) -> Result<Endpoint, LinkError> {
        let wire = self
            .channels
            .lock()
            .get(&id)
            .cloned()
            .ok_or(LinkError::UnknownChannel(id))?;
        wire.attach(direction)
    }

    /// Cancel everything pending on a channel and forget it
    pub fn delete_channel(&self, id: ChannelId) -> Result<(), LinkError> {
        let wire = self
            .channels
            .lock()
            .remove(&id)
            .ok_or(LinkError::UnknownChannel(id))?;
        wire.close();
        Ok(())
    }

    /// Close every channel without forgetting them, waking all blocked
    /// reclaimers on both sides
    pub fn close_all(&self) {
        let wires: Vec<_> = self.channels.lock().values().cloned().collect();
        for wire in wires {
            wire.close();
        }
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.channels.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::PoolAttrs;
    use crate::types::{PoolId, Timeout, FROM_ACCELERATOR, TO_ACCELERATOR};

    #[test]
    fn test_create_and_open() {
        let link = Link::new(0);
        let host = link
            .create_channel(TO_ACCELERATOR, Direction::Outbound, ChannelAttrs::default())
            .unwrap();
        let dsp = link.open_channel(TO_ACCELERATOR, Direction::Inbound).unwrap();

        assert_eq!(host.id(), dsp.id());
        assert_eq!(host.direction(), Direction::Outbound);
        assert_eq!(dsp.direction(), Direction::Inbound);
    }

    #[test]
    fn test_duplicate_and_unknown_channels() {
        let link = Link::new(0);
        let _host = link
            .create_channel(TO_ACCELERATOR, Direction::Outbound, ChannelAttrs::default())
            .unwrap();

        assert_eq!(
            link.create_channel(TO_ACCELERATOR, Direction::Outbound, ChannelAttrs::default())
                .unwrap_err(),
            LinkError::ChannelExists(TO_ACCELERATOR)
        );
        assert_eq!(
            link.open_channel(TO_ACCELERATOR, Direction::Outbound)
                .unwrap_err(),
            LinkError::EndpointInUse {
                channel: TO_ACCELERATOR,
                direction: Direction::Outbound
            }
        );
        assert_eq!(
            link.open_channel(FROM_ACCELERATOR, Direction::Outbound)
                .unwrap_err(),
            LinkError::UnknownChannel(FROM_ACCELERATOR)
        );
    }

    #[test]
    fn test_delete_cancels_and_wakes() {
        let link = Arc::new(Link::new(1));
        let pool_id = PoolId::make(1, 0);
        let pool = link
            .pools()
            .open(
                pool_id,
                PoolAttrs {
                    buffer_size: 16,
                    num_buffers: 1,
                },
            )
            .unwrap();

        let host = link
            .create_channel(FROM_ACCELERATOR, Direction::Inbound, ChannelAttrs::default())
            .unwrap();
        host.issue(pool.allocate(16).unwrap(), 16).unwrap();

        let l = link.clone();
        let deleter = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            l.delete_channel(FROM_ACCELERATOR).unwrap();
        });

        assert_eq!(
            host.reclaim(Timeout::Forever).unwrap_err(),
            LinkError::Cancelled(FROM_ACCELERATOR)
        );
        deleter.join().unwrap();

        assert!(link.channel_ids().is_empty());
        link.pools().close(pool_id).unwrap();
    }

    #[test]
    fn test_close_all() {
        let link = Link::new(0);
        let a = link
            .create_channel(TO_ACCELERATOR, Direction::Outbound, ChannelAttrs::default())
            .unwrap();
        let b = link
            .create_channel(FROM_ACCELERATOR, Direction::Inbound, ChannelAttrs::default())
            .unwrap();

        link.close_all();
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(link.channel_ids(), vec![TO_ACCELERATOR, FROM_ACCELERATOR]);
    }
}
