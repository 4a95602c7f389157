use crate::backend::UniqueId;

/// Immutable event definition plus the bookkeeping that keeps it alive while
/// executions of it are still in flight.
///
/// Destroying a trigger that still has live instances only marks it; the world frees
/// it once the last instance is released.
#[derive(Debug)]
pub struct Trigger {
    event_id: UniqueId,
    max_attenuation_radius: f32,
    name: String,
    instance_count: u32,
    pending_destruction: bool,
}

impl Trigger {
    pub(crate) fn new(event_id: UniqueId, max_attenuation_radius: f32, name: String) -> Self {
        Self {
            event_id,
            max_attenuation_radius,
            name,
            instance_count: 0,
            pending_destruction: false,
        }
    }

    pub fn event_id(&self) -> UniqueId {
        self.event_id
    }

    pub fn max_attenuation_radius(&self) -> f32 {
        self.max_attenuation_radius
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn is_pending_destruction(&self) -> bool {
        self.pending_destruction
    }

    pub(crate) fn acquire(&mut self) {
        self.instance_count += 1;
    }

    /// Returns true when the trigger was marked for destruction and this was its last
    /// instance.
    pub(crate) fn release(&mut self) -> bool {
        if self.instance_count == 0 {
            debug_assert!(false, "trigger \"{}\" released more often than acquired", self.name);
            log::error!(
                "Instance count of trigger \"{}\" would underflow",
                self.name
            );
            return false;
        }

        self.instance_count -= 1;
        self.can_be_destroyed()
    }

    /// Returns true if the trigger can be freed right away.
    pub(crate) fn mark_for_destruction(&mut self) -> bool {
        self.pending_destruction = true;
        self.instance_count == 0
    }

    fn can_be_destroyed(&self) -> bool {
        self.pending_destruction && self.instance_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreferenced_trigger_is_freed_immediately() {
        let mut trigger = Trigger::new(1, 0.0, "one_shot".to_string());
        assert!(trigger.mark_for_destruction());
    }

    #[test]
    fn test_deferred_destruction_waits_for_last_instance() {
        let mut trigger = Trigger::new(1, 20.0, "loop".to_string());
        trigger.acquire();
        trigger.acquire();
        assert_eq!(trigger.instance_count(), 2);

        assert!(!trigger.mark_for_destruction());
        assert!(!trigger.release());
        assert_eq!(trigger.instance_count(), 1);
        assert!(trigger.release());
        assert_eq!(trigger.instance_count(), 0);
    }

    #[test]
    fn test_release_without_mark_keeps_trigger() {
        let mut trigger = Trigger::new(1, 0.0, "loop".to_string());
        trigger.acquire();
        assert!(!trigger.release());
        assert!(!trigger.is_pending_destruction());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released more often than acquired")]
    fn test_underflow_asserts_in_debug() {
        let mut trigger = Trigger::new(1, 0.0, "broken".to_string());
        trigger.release();
    }
}
