//! First-match combination of presence resolvers.

use super::NetworkPresence;
use crate::vmm::InstanceSpec;
use guestprep_shared::errors::GuestprepResult;
use std::net::IpAddr;
use tracing::debug;

pub struct CompositeResolver {
    resolvers: Vec<Box<dyn NetworkPresence>>,
}

impl CompositeResolver {
    pub fn new(resolvers: Vec<Box<dyn NetworkPresence>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait::async_trait]
impl NetworkPresence for CompositeResolver {
    /// Polls each resolver in order. A failing resolver is skipped
    /// unless every resolver fails.
    async fn resolve(&self, spec: &InstanceSpec) -> GuestprepResult<Option<IpAddr>> {
        let mut last_err = None;
        for resolver in &self.resolvers {
            match resolver.resolve(spec).await {
                Ok(Some(ip)) => return Ok(Some(ip)),
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "Presence resolver failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if self.resolvers.len() == 1 => Err(e),
            _ => Ok(None),
        }
    }

    fn announce_port(&self) -> Option<u16> {
        self.resolvers.iter().find_map(|r| r.announce_port())
    }

    fn forget(&self, spec: &InstanceSpec) {
        for resolver in &self.resolvers {
            resolver.forget(spec);
        }
    }
}
