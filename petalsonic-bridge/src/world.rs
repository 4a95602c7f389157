use crate::aux_thread::AuxThread;
use crate::backend::{
    Backend, BackendSettings, BankId, GameObjectId, PanningRule, UniqueId, unique_id,
};
use crate::config::{
    BridgeDesc, EnvironmentInfo, FileInfo, ParameterInfo, SwitchStateInfo, TriggerInfo,
};
use crate::connections::{Environment, File, Parameter, SwitchState};
use crate::error::{BridgeError, RequestStatus, Result, TriggerResult};
use crate::event_instance::{EventInstance, TriggerInstanceId};
use crate::events::BridgeEvent;
use crate::listener::Listener;
use crate::math::Transformation;
use crate::object::{Object, ObjectContext, ObjectFunctionality, report};
use crate::pool::{
    EnvironmentKey, EventInstanceKey, FileKey, ListenerKey, ObjectKey, ParameterKey, Pool,
    PoolStats, SwitchStateKey, TriggerKey,
};
use crate::trigger::Trigger;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::collections::HashMap;
use std::sync::Arc;

/// Game object id of the global object. Ids below it are reserved by the backend.
pub const GLOBAL_OBJECT_ID: GameObjectId = GameObjectId(2);
const GLOBAL_OBJECT_NAME: &str = "GlobalObject";

/// Occupancy of every pool in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldPoolStats {
    pub objects: PoolStats,
    pub listeners: PoolStats,
    pub triggers: PoolStats,
    pub event_instances: PoolStats,
    pub parameters: PoolStats,
    pub switch_states: PoolStats,
    pub environments: PoolStats,
    pub files: PoolStats,
}

/// Entry point of the bridge.
///
/// `AudioWorld` owns every object, listener, trigger and connection in fixed-capacity
/// pools and translates requests on them into backend calls. It is driven from a
/// single thread: call [`AudioWorld::update`] once per frame and drain reports with
/// [`AudioWorld::poll_events`].
///
/// # Threading
///
/// - **Calling thread**: owns the world, performs every request and the per-frame update
/// - **Backend threads**: may fire end-of-event callbacks, which only flip an atomic flag
/// - **Aux thread**: only exists when the backend's internal thread is disabled; renders
///   while the calling thread is blocked in a synchronous bank call
pub struct AudioWorld {
    desc: BridgeDesc,
    backend: Arc<dyn Backend>,
    objects: Pool<ObjectKey, Object>,
    global_object: ObjectKey,
    listeners: Pool<ListenerKey, Listener>,
    default_listener: Option<ListenerKey>,
    triggers: Pool<TriggerKey, Trigger>,
    event_instances: Pool<EventInstanceKey, EventInstance>,
    parameters: Pool<ParameterKey, Parameter>,
    switch_states: Pool<SwitchStateKey, SwitchState>,
    environments: Pool<EnvironmentKey, Environment>,
    files: Pool<FileKey, File>,
    max_attenuations: HashMap<UniqueId, f32>,
    language: String,
    next_game_object_id: u64,
    init_bank: Option<BankId>,
    aux_thread: Option<AuxThread>,
    event_sender: Sender<BridgeEvent>,
    event_receiver: Receiver<BridgeEvent>,
    is_shut_down: bool,
}

impl AudioWorld {
    pub fn new(desc: BridgeDesc, backend: Arc<dyn Backend>) -> Result<Self> {
        desc.validate()?;

        backend.init(&BackendSettings {
            enable_internal_thread: desc.enable_internal_thread,
        })?;

        let mut objects = Pool::with_capacity("objects", desc.object_pool_size);
        let global_object = objects.insert(Object::new_global(
            GLOBAL_OBJECT_ID,
            GLOBAL_OBJECT_NAME.to_string(),
        ))?;

        if let Err(error) = backend.register_game_object(GLOBAL_OBJECT_ID, GLOBAL_OBJECT_NAME) {
            log::warn!("Failed to register the global object: {}", error);
        }

        let aux_thread = if desc.enable_internal_thread {
            None
        } else {
            match AuxThread::spawn(backend.clone()) {
                Ok(aux_thread) => Some(aux_thread),
                Err(error) => {
                    backend.term();
                    return Err(error);
                }
            }
        };

        let (event_sender, event_receiver) = unbounded();

        let mut world = Self {
            listeners: Pool::with_capacity("listeners", desc.listener_pool_size),
            default_listener: None,
            triggers: Pool::with_capacity("triggers", desc.trigger_pool_size),
            event_instances: Pool::with_capacity("event instances", desc.event_pool_size),
            parameters: Pool::with_capacity("parameters", desc.parameter_pool_size),
            switch_states: Pool::with_capacity("switch states", desc.switch_state_pool_size),
            environments: Pool::with_capacity("environments", desc.environment_pool_size),
            files: Pool::with_capacity("files", desc.file_pool_size),
            desc,
            backend,
            objects,
            global_object,
            max_attenuations: HashMap::new(),
            language: String::new(),
            next_game_object_id: GLOBAL_OBJECT_ID.0 + 1,
            init_bank: None,
            aux_thread,
            event_sender,
            event_receiver,
            is_shut_down: false,
        };

        let language = world.desc.language.clone();
        world.set_language(&language);
        world.load_init_bank();

        log::info!(
            "Audio world created (internal thread: {})",
            world.desc.enable_internal_thread
        );

        Ok(world)
    }

    pub fn desc(&self) -> &BridgeDesc {
        &self.desc
    }

    pub fn global_object(&self) -> ObjectKey {
        self.global_object
    }

    pub fn object(&self, key: ObjectKey) -> Option<&Object> {
        self.objects.get(key)
    }

    pub fn listener(&self, key: ListenerKey) -> Option<&Listener> {
        self.listeners.get(key)
    }

    pub fn trigger(&self, key: TriggerKey) -> Option<&Trigger> {
        self.triggers.get(key)
    }

    pub fn event_instance(&self, key: EventInstanceKey) -> Option<&EventInstance> {
        self.event_instances.get(key)
    }

    pub fn file(&self, key: FileKey) -> Option<&File> {
        self.files.get(key)
    }

    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }

    pub fn pool_stats(&self) -> WorldPoolStats {
        WorldPoolStats {
            objects: self.objects.stats(),
            listeners: self.listeners.stats(),
            triggers: self.triggers.stats(),
            event_instances: self.event_instances.stats(),
            parameters: self.parameters.stats(),
            switch_states: self.switch_states.stats(),
            environments: self.environments.stats(),
            files: self.files.stats(),
        }
    }

    /// Drains every report published since the last call.
    pub fn poll_events(&self) -> Vec<BridgeEvent> {
        self.event_receiver.try_iter().collect()
    }

    fn next_game_object_id(&mut self) -> GameObjectId {
        let id = GameObjectId(self.next_game_object_id);
        self.next_game_object_id += 1;
        id
    }

    /// Runs a blocking backend call, pumping the render step from the aux thread while
    /// it is in flight if the backend has no internal thread.
    fn with_aux_bracket<T>(&self, call: impl FnOnce(&dyn Backend) -> T) -> T {
        match &self.aux_thread {
            Some(aux_thread) => {
                aux_thread.signal_start();
                let result = call(self.backend.as_ref());
                aux_thread.signal_stop_and_wait();
                result
            }
            None => call(self.backend.as_ref()),
        }
    }

    fn load_init_bank(&mut self) -> RequestStatus {
        match self.backend.load_bank(&self.desc.init_bank_name) {
            Ok(bank) => {
                self.init_bank = Some(bank);
                RequestStatus::Success
            }
            Err(error) => {
                log::error!(
                    "Failed to load init bank \"{}\": {}",
                    self.desc.init_bank_name,
                    error
                );
                RequestStatus::Failure
            }
        }
    }

    fn release_trigger(triggers: &mut Pool<TriggerKey, Trigger>, key: TriggerKey) {
        let can_be_freed = triggers.get_mut(key).is_some_and(|trigger| trigger.release());
        if can_be_freed && let Some(trigger) = triggers.remove(key) {
            log::debug!("Freed trigger \"{}\" after its last instance", trigger.name());
        }
    }

    /// Per-frame tick: listeners first, then objects, then one backend render step.
    pub fn update(&mut self, delta_time: f32) {
        if self.is_shut_down {
            return;
        }

        for (_, listener) in self.listeners.iter_mut() {
            listener.update(delta_time);
        }

        let mut finished = Vec::new();
        let mut context = ObjectContext {
            backend: self.backend.as_ref(),
            listeners: &self.listeners,
            event_instances: &mut self.event_instances,
            events: &self.event_sender,
            velocity_tracking_threshold: self.desc.velocity_tracking_threshold,
        };

        for (key, object) in self.objects.iter_mut() {
            finished.extend(object.update(key, delta_time, &mut context));
        }

        for instance in finished {
            Self::release_trigger(&mut self.triggers, instance.trigger());
        }

        self.backend.render_audio();
    }

    /// Unloads and reloads the init bank.
    pub fn on_refresh(&mut self) -> RequestStatus {
        if let Some(bank) = self.init_bank.take()
            && let Err(error) = self.with_aux_bracket(|backend| backend.unload_bank(bank))
        {
            log::error!("Failed to unload init bank: {}", error);
        }

        self.load_init_bank()
    }

    /// Points localized banks at the folder of `language`. Banks that are already
    /// loaded keep the language they were loaded with.
    pub fn set_language(&mut self, language: &str) -> RequestStatus {
        let folder = self.desc.localized_bank_folder(language);
        match self.backend.set_language_folder(&folder) {
            Ok(()) => {
                self.language = language.to_string();
                log::debug!("Language set to \"{}\" ({})", language, folder);
                RequestStatus::Success
            }
            Err(error) => {
                log::warn!("Failed to set language \"{}\": {}", language, error);
                RequestStatus::Failure
            }
        }
    }

    /// Language localized banks currently resolve against. Empty until the first
    /// successful [`AudioWorld::set_language`].
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn set_panning_rule(&mut self, rule: PanningRule) -> RequestStatus {
        let result = self.backend.set_panning_rule(rule);
        if let Err(error) = &result {
            log::warn!("Failed to set panning rule {:?}: {}", rule, error);
        }
        result.into()
    }

    /// Tears the backend down. Safe to call more than once; also runs on drop.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.is_shut_down {
            return Ok(());
        }
        self.is_shut_down = true;

        if let Err(error) = self.with_aux_bracket(|backend| backend.clear_banks()) {
            log::error!("Failed to clear banks: {}", error);
        }
        self.init_bank = None;
        for file in self.files.iter_mut().map(|(_, file)| file) {
            file.set_bank(None);
        }

        for game_object in self.backend.active_game_objects() {
            self.backend.cancel_event_callbacks(game_object);
        }

        let aux_result = match self.aux_thread.take() {
            Some(mut aux_thread) => aux_thread.shutdown(),
            None => Ok(()),
        };

        self.backend.term();
        log::info!("Audio world shut down");

        aux_result
    }

    // Objects

    pub fn construct_object(
        &mut self,
        transformation: Transformation,
        name: impl Into<String>,
    ) -> Result<ObjectKey> {
        let name = name.into();
        let game_object_id = GameObjectId(self.next_game_object_id);
        let key = self
            .objects
            .insert(Object::new(game_object_id, name.clone(), transformation))?;
        self.next_game_object_id();

        if let Err(error) = self.backend.register_game_object(game_object_id, &name) {
            log::warn!("Failed to register object \"{}\": {}", name, error);
        }
        if let Err(error) = self.backend.set_position(game_object_id, &transformation) {
            log::warn!("Failed to set position of object \"{}\": {}", name, error);
        }

        if let Some(object) = self.objects.get_mut(key) {
            for (listener_key, listener) in self.listeners.iter_mut() {
                object.add_listener(listener_key, listener);
            }
            object.update_distances(&self.listeners);
        }

        log::debug!("Constructed object \"{}\" as {}", name, game_object_id);
        Ok(key)
    }

    pub fn destruct_object(&mut self, key: ObjectKey) -> RequestStatus {
        if key == self.global_object {
            log::warn!("The global object cannot be destructed");
            return RequestStatus::Failure;
        }

        let Some(mut object) = self.objects.remove(key) else {
            log::warn!("Destruct of unknown object {}", key);
            return RequestStatus::Failure;
        };

        object.release_listeners(&mut self.listeners);

        let game_object_id = object.game_object_id();
        self.backend.stop_all(Some(game_object_id));
        self.backend.cancel_event_callbacks(game_object_id);

        for instance_key in object.take_event_instances() {
            if let Some(instance) = self.event_instances.remove(instance_key) {
                report(&self.event_sender, BridgeEvent::TriggerInstanceFinished {
                    object: key,
                    trigger_instance_id: instance.trigger_instance_id(),
                });
                Self::release_trigger(&mut self.triggers, instance.trigger());
            }
        }

        let result = self.backend.unregister_game_object(game_object_id);
        if let Err(error) = &result {
            log::warn!(
                "Failed to unregister object \"{}\": {}",
                object.name(),
                error
            );
        }

        log::debug!("Destructed object \"{}\"", object.name());
        result.into()
    }

    pub fn set_object_transformation(
        &mut self,
        key: ObjectKey,
        transformation: Transformation,
    ) -> RequestStatus {
        let Some(object) = self.objects.get_mut(key) else {
            log::warn!("Transformation set on unknown object {}", key);
            return RequestStatus::Failure;
        };

        object.set_transformation(
            self.backend.as_ref(),
            transformation,
            &self.listeners,
            self.desc.position_update_threshold_multiplier,
        )
    }

    pub fn set_object_name(&mut self, key: ObjectKey, name: impl Into<String>) -> RequestStatus {
        let Some(object) = self.objects.get_mut(key) else {
            log::warn!("Name set on unknown object {}", key);
            return RequestStatus::Failure;
        };

        object.set_name(self.backend.as_ref(), name.into())
    }

    pub fn execute_trigger(
        &mut self,
        object_key: ObjectKey,
        trigger_key: TriggerKey,
        trigger_instance_id: TriggerInstanceId,
    ) -> TriggerResult {
        let Some(object) = self.objects.get_mut(object_key) else {
            log::warn!("Trigger executed on unknown object {}", object_key);
            return TriggerResult::Failure;
        };

        let Some(trigger) = self.triggers.get_mut(trigger_key) else {
            log::warn!("Unknown trigger {} executed", trigger_key);
            return TriggerResult::Failure;
        };

        if trigger.is_pending_destruction() {
            log::warn!(
                "Trigger \"{}\" is being destructed and cannot be executed",
                trigger.name()
            );
            return TriggerResult::Failure;
        }

        object.update_distances(&self.listeners);
        object.execute_trigger(
            object_key,
            self.backend.as_ref(),
            &mut self.event_instances,
            trigger_key,
            trigger,
            trigger_instance_id,
        )
    }

    pub fn stop_trigger(&mut self, object_key: ObjectKey, trigger_key: TriggerKey) -> RequestStatus {
        let Some(object) = self.objects.get(object_key) else {
            log::warn!("Trigger stopped on unknown object {}", object_key);
            return RequestStatus::Failure;
        };

        object.stop_trigger(
            self.backend.as_ref(),
            &self.event_instances,
            trigger_key,
            self.desc.stop_fade_ms,
        )
    }

    pub fn stop_all_triggers(&mut self, object_key: ObjectKey) -> RequestStatus {
        let Some(object) = self.objects.get(object_key) else {
            log::warn!("Triggers stopped on unknown object {}", object_key);
            return RequestStatus::Failure;
        };

        object.stop_all_triggers(self.backend.as_ref());
        RequestStatus::Success
    }

    /// Stops every playing event on every object.
    pub fn stop_all_sounds(&mut self) {
        self.backend.stop_all(None);
    }

    pub fn set_parameter(
        &mut self,
        object_key: ObjectKey,
        parameter_key: ParameterKey,
        value: f32,
    ) -> RequestStatus {
        let (Some(object), Some(parameter)) = (
            self.objects.get(object_key),
            self.parameters.get(parameter_key),
        ) else {
            log::warn!(
                "Parameter {} set on object {} with an invalid handle",
                parameter_key,
                object_key
            );
            return RequestStatus::Failure;
        };

        object.set_parameter(self.backend.as_ref(), parameter, value)
    }

    pub fn set_global_parameter(&mut self, parameter_key: ParameterKey, value: f32) -> RequestStatus {
        self.set_parameter(self.global_object, parameter_key, value)
    }

    pub fn set_switch_state(
        &mut self,
        object_key: ObjectKey,
        switch_state_key: SwitchStateKey,
    ) -> RequestStatus {
        let (Some(object), Some(switch_state)) = (
            self.objects.get(object_key),
            self.switch_states.get(switch_state_key),
        ) else {
            log::warn!(
                "Switch state {} set on object {} with an invalid handle",
                switch_state_key,
                object_key
            );
            return RequestStatus::Failure;
        };

        object.set_switch_state(self.backend.as_ref(), switch_state)
    }

    pub fn set_global_switch_state(&mut self, switch_state_key: SwitchStateKey) -> RequestStatus {
        self.set_switch_state(self.global_object, switch_state_key)
    }

    pub fn set_environment(
        &mut self,
        object_key: ObjectKey,
        environment_key: EnvironmentKey,
        amount: f32,
    ) -> RequestStatus {
        let (Some(object), Some(environment)) = (
            self.objects.get_mut(object_key),
            self.environments.get(environment_key),
        ) else {
            log::warn!(
                "Environment {} set on object {} with an invalid handle",
                environment_key,
                object_key
            );
            return RequestStatus::Failure;
        };

        object.set_environment(self.backend.as_ref(), environment, amount)
    }

    pub fn toggle_functionality(
        &mut self,
        object_key: ObjectKey,
        functionality: ObjectFunctionality,
        enable: bool,
    ) -> RequestStatus {
        let Some(object) = self.objects.get_mut(object_key) else {
            log::warn!("Functionality toggled on unknown object {}", object_key);
            return RequestStatus::Failure;
        };

        object.toggle_functionality(
            self.backend.as_ref(),
            functionality,
            enable,
            &mut self.listeners,
        )
    }

    pub fn add_object_listener(
        &mut self,
        object_key: ObjectKey,
        listener_key: ListenerKey,
    ) -> RequestStatus {
        let (Some(object), Some(listener)) = (
            self.objects.get_mut(object_key),
            self.listeners.get_mut(listener_key),
        ) else {
            log::warn!(
                "Listener {} added to object {} with an invalid handle",
                listener_key,
                object_key
            );
            return RequestStatus::Failure;
        };

        if object.is_global() {
            log::warn!("The global object has no listener associations");
            return RequestStatus::Failure;
        }

        object.add_listener(listener_key, listener);
        object.update_distances(&self.listeners);
        RequestStatus::Success
    }

    pub fn remove_object_listener(
        &mut self,
        object_key: ObjectKey,
        listener_key: ListenerKey,
    ) -> RequestStatus {
        let Some(object) = self.objects.get_mut(object_key) else {
            log::warn!("Listener removed from unknown object {}", object_key);
            return RequestStatus::Failure;
        };

        object.remove_listener(listener_key, self.listeners.get_mut(listener_key));
        object.update_distances(&self.listeners);
        RequestStatus::Success
    }

    // Listeners

    /// Registers a new listener. The first listener becomes the backend's default
    /// listener. Fails without leaving a pool entry behind if the backend rejects it.
    pub fn construct_listener(
        &mut self,
        transformation: Transformation,
        name: impl Into<String>,
    ) -> Result<ListenerKey> {
        let name = name.into();
        let game_object_id = GameObjectId(self.next_game_object_id);
        let key = self
            .listeners
            .insert(Listener::new(game_object_id, name.clone(), transformation))?;

        if let Err(error) = self.backend.register_game_object(game_object_id, &name) {
            log::warn!("Failed to register listener \"{}\": {}", name, error);
            self.listeners.remove(key);
            return Err(BridgeError::Backend(error));
        }
        if self.default_listener.is_none() {
            if let Err(error) = self.backend.set_default_listener(game_object_id) {
                log::warn!("Failed to make \"{}\" the default listener: {}", name, error);
                if let Err(unregister_error) = self.backend.unregister_game_object(game_object_id)
                {
                    log::warn!(
                        "Failed to unregister listener \"{}\": {}",
                        name,
                        unregister_error
                    );
                }
                self.listeners.remove(key);
                return Err(BridgeError::Backend(error));
            }
            self.default_listener = Some(key);
        }
        self.next_game_object_id();

        if let Err(error) = self.backend.set_position(game_object_id, &transformation) {
            log::warn!("Failed to set position of listener \"{}\": {}", name, error);
        }

        if let Some(listener) = self.listeners.get_mut(key) {
            for (_, object) in self.objects.iter_mut() {
                if !object.is_global() {
                    object.add_listener(key, listener);
                }
            }
        }

        for (_, object) in self.objects.iter_mut() {
            object.update_distances(&self.listeners);
        }

        log::debug!("Constructed listener \"{}\" as {}", name, game_object_id);
        Ok(key)
    }

    /// Removes a listener. If it was the default listener, the next remaining one
    /// takes its place.
    pub fn destruct_listener(&mut self, key: ListenerKey) -> RequestStatus {
        let Some(mut listener) = self.listeners.remove(key) else {
            log::warn!("Destruct of unknown listener {}", key);
            return RequestStatus::Failure;
        };

        for (_, object) in self.objects.iter_mut() {
            object.remove_listener(key, Some(&mut listener));
            object.update_distances(&self.listeners);
        }

        let result = self.backend.unregister_game_object(listener.game_object_id());
        if let Err(error) = &result {
            log::warn!(
                "Failed to unregister listener \"{}\": {}",
                listener.name(),
                error
            );
        }

        if self.default_listener == Some(key) {
            self.promote_default_listener();
        }

        result.into()
    }

    fn promote_default_listener(&mut self) {
        self.default_listener = None;
        let Some((key, listener)) = self.listeners.iter().next() else {
            return;
        };

        match self.backend.set_default_listener(listener.game_object_id()) {
            Ok(()) => {
                log::debug!("\"{}\" is now the default listener", listener.name());
                self.default_listener = Some(key);
            }
            Err(error) => log::warn!(
                "Failed to make \"{}\" the default listener: {}",
                listener.name(),
                error
            ),
        }
    }

    pub fn set_listener_transformation(
        &mut self,
        key: ListenerKey,
        transformation: Transformation,
    ) -> RequestStatus {
        let Some(listener) = self.listeners.get_mut(key) else {
            log::warn!("Transformation set on unknown listener {}", key);
            return RequestStatus::Failure;
        };

        listener.set_transformation(self.backend.as_ref(), transformation)
    }

    pub fn set_listener_name(&mut self, key: ListenerKey, name: impl Into<String>) -> RequestStatus {
        let Some(listener) = self.listeners.get_mut(key) else {
            log::warn!("Name set on unknown listener {}", key);
            return RequestStatus::Failure;
        };

        let name = name.into();
        let result = self
            .backend
            .register_game_object(listener.game_object_id(), &name);
        if let Err(error) = &result {
            log::warn!("Failed to rename listener \"{}\": {}", listener.name(), error);
        }
        listener.set_name(name);
        result.into()
    }

    // Triggers

    /// Sets the attenuation radii used when triggers are constructed by name.
    pub fn set_max_attenuations<I, S>(&mut self, attenuations: I)
    where
        I: IntoIterator<Item = (S, f32)>,
        S: AsRef<str>,
    {
        self.max_attenuations = attenuations
            .into_iter()
            .map(|(name, radius)| (unique_id(name.as_ref()), radius))
            .collect();
    }

    pub fn construct_trigger(&mut self, info: &TriggerInfo) -> Result<TriggerKey> {
        let event_id = info.event_id();
        let (radius, name) = match info {
            TriggerInfo::Named { name } => (
                self.max_attenuations.get(&event_id).copied().unwrap_or(0.0),
                name.clone(),
            ),
            TriggerInfo::Raw { radius, name, .. } => (
                *radius,
                name.clone().unwrap_or_else(|| event_id.to_string()),
            ),
        };

        let key = self.triggers.insert(Trigger::new(event_id, radius, name))?;
        Ok(key)
    }

    /// Frees the trigger, or defers that until its last instance has ended.
    pub fn destruct_trigger(&mut self, key: TriggerKey) -> RequestStatus {
        let Some(trigger) = self.triggers.get_mut(key) else {
            log::warn!("Destruct of unknown trigger {}", key);
            return RequestStatus::Failure;
        };

        if trigger.mark_for_destruction() {
            self.triggers.remove(key);
        } else {
            log::debug!(
                "Trigger \"{}\" still has {} instances, destruction deferred",
                trigger.name(),
                trigger.instance_count()
            );
        }
        RequestStatus::Success
    }

    // Connections

    pub fn construct_parameter(&mut self, info: &ParameterInfo) -> Result<ParameterKey> {
        self.parameters.insert(Parameter::from_info(info))
    }

    pub fn destruct_parameter(&mut self, key: ParameterKey) -> RequestStatus {
        removal_status(self.parameters.remove(key), "parameters")
    }

    pub fn construct_switch_state(&mut self, info: &SwitchStateInfo) -> Result<SwitchStateKey> {
        self.switch_states.insert(SwitchState::from_info(info))
    }

    pub fn destruct_switch_state(&mut self, key: SwitchStateKey) -> RequestStatus {
        removal_status(self.switch_states.remove(key), "switch states")
    }

    pub fn construct_environment(&mut self, info: &EnvironmentInfo) -> Result<EnvironmentKey> {
        self.environments.insert(Environment::from_info(info))
    }

    pub fn destruct_environment(&mut self, key: EnvironmentKey) -> RequestStatus {
        removal_status(self.environments.remove(key), "environments")
    }

    // Files

    pub fn construct_file(&mut self, info: &FileInfo) -> Result<FileKey> {
        self.files.insert(File::from_info(info))
    }

    /// Unregisters the file if it is still loaded, then forgets it.
    pub fn destruct_file(&mut self, key: FileKey) -> RequestStatus {
        if !self.files.contains(key) {
            log::warn!("Destruct of unknown file {}", key);
            return RequestStatus::Failure;
        }

        let status = self.unregister_in_memory_file(key);
        self.files.remove(key);
        status
    }

    /// Path the backend loads `key` from: the language folder for localized files,
    /// the bank folder otherwise.
    pub fn file_location(&self, key: FileKey) -> Option<String> {
        let file = self.files.get(key)?;
        let folder = if file.is_localized() {
            self.desc.localized_bank_folder(&self.language)
        } else {
            self.desc.bank_folder.clone()
        };
        Some(format!("{}/{}", folder, file.name()))
    }

    /// Loads a file from disk, see [`AudioWorld::file_location`].
    pub fn load_file(&mut self, key: FileKey) -> RequestStatus {
        let Some(location) = self.file_location(key) else {
            log::warn!("Load of unknown file {}", key);
            return RequestStatus::Failure;
        };

        let Some(file) = self.files.get_mut(key) else {
            return RequestStatus::Failure;
        };

        if file.bank().is_some() {
            log::warn!("File \"{}\" is already loaded", file.name());
            return RequestStatus::Failure;
        }

        match self.backend.load_bank(&location) {
            Ok(bank) => {
                file.set_bank(Some(bank));
                log::debug!("Loaded file \"{}\" from {}", file.name(), location);
                RequestStatus::Success
            }
            Err(error) => {
                log::error!("Failed to load file \"{}\": {}", location, error);
                RequestStatus::Failure
            }
        }
    }

    pub fn register_in_memory_file(&mut self, key: FileKey, data: &[u8]) -> RequestStatus {
        let Some(file) = self.files.get_mut(key) else {
            log::warn!("Register of unknown file {}", key);
            return RequestStatus::Failure;
        };

        if file.bank().is_some() {
            log::warn!("File \"{}\" is already registered", file.name());
            return RequestStatus::Failure;
        }

        match self.backend.load_bank_from_memory(data) {
            Ok(bank) => {
                file.set_bank(Some(bank));
                log::debug!("Registered file \"{}\"", file.name());
                RequestStatus::Success
            }
            Err(error) => {
                log::error!("Failed to load file \"{}\": {}", file.name(), error);
                RequestStatus::Failure
            }
        }
    }

    pub fn unregister_in_memory_file(&mut self, key: FileKey) -> RequestStatus {
        let Some(bank) = self.files.get(key).and_then(File::bank) else {
            return RequestStatus::Success;
        };

        let result = self.with_aux_bracket(|backend| backend.unload_bank(bank));

        let Some(file) = self.files.get_mut(key) else {
            return RequestStatus::Failure;
        };

        match result {
            Ok(()) => {
                file.set_bank(None);
                log::debug!("Unregistered file \"{}\"", file.name());
                RequestStatus::Success
            }
            Err(error) => {
                log::error!("Failed to unload file \"{}\": {}", file.name(), error);
                RequestStatus::Failure
            }
        }
    }
}

impl Drop for AudioWorld {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            log::error!("Failed to shut down audio world: {}", error);
        }
    }
}

fn removal_status<V>(removed: Option<V>, pool: &str) -> RequestStatus {
    if removed.is_some() {
        RequestStatus::Success
    } else {
        log::warn!("Destruct of unknown entry in {}", pool);
        RequestStatus::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, BackendOperation, NullBackend};
    use crate::math::Vec3;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn world_with(desc: BridgeDesc) -> (Arc<NullBackend>, AudioWorld) {
        init_logger();
        let backend = Arc::new(NullBackend::new());
        let world = AudioWorld::new(desc, backend.clone()).unwrap();
        (backend, world)
    }

    fn at(x: f32) -> Transformation {
        Transformation::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_new_registers_global_object_and_init_bank() {
        let (backend, world) = world_with(BridgeDesc::default());

        assert!(backend.is_initialized());
        assert!(backend.is_registered(GLOBAL_OBJECT_ID));
        assert_eq!(backend.loaded_banks(), vec!["Init.bnk".to_string()]);
        assert!(world.object(world.global_object()).unwrap().is_global());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        init_logger();
        let backend = Arc::new(NullBackend::new());
        let result = AudioWorld::new(BridgeDesc::default().with_object_pool_size(0), backend.clone());

        assert!(matches!(result, Err(BridgeError::Configuration(_))));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_backend_init_failure_is_reported() {
        init_logger();
        let backend = Arc::new(NullBackend::new());
        backend.set_failing(BackendOperation::Init, true);

        let result = AudioWorld::new(BridgeDesc::default(), backend);
        assert!(matches!(result, Err(BridgeError::Backend(_))));
    }

    #[test]
    fn test_object_pool_exhaustion() {
        let (_backend, mut world) = world_with(BridgeDesc::default().with_object_pool_size(2));

        world.construct_object(at(0.0), "first").unwrap();
        let result = world.construct_object(at(1.0), "second");
        assert!(matches!(
            result,
            Err(BridgeError::PoolExhausted {
                pool: "objects",
                capacity: 2
            })
        ));
    }

    #[test]
    fn test_game_object_ids_follow_global_object() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let listener = world.construct_listener(at(0.0), "camera").unwrap();
        let object = world.construct_object(at(1.0), "door").unwrap();

        assert_eq!(world.listener(listener).unwrap().game_object_id(), GameObjectId(3));
        assert_eq!(world.object(object).unwrap().game_object_id(), GameObjectId(4));
        assert_eq!(backend.default_listener(), Some(GameObjectId(3)));
    }

    #[test]
    fn test_new_objects_associate_with_all_listeners() {
        let (_backend, mut world) = world_with(BridgeDesc::default());
        world.construct_listener(at(10.0), "near").unwrap();
        world.construct_listener(at(50.0), "far").unwrap();
        let object = world.construct_object(at(0.0), "emitter").unwrap();

        let object = world.object(object).unwrap();
        assert_eq!(object.listener_associations().len(), 2);
        assert_eq!(object.shortest_distance_to_listener(), 10.0);
    }

    #[test]
    fn test_virtualization_follows_closest_listener() {
        let (_backend, mut world) = world_with(BridgeDesc::default());
        let near = world.construct_listener(at(10.0), "near").unwrap();
        let far = world.construct_listener(at(50.0), "far").unwrap();
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 30.0)).unwrap();

        assert_eq!(world.execute_trigger(object, trigger, 1), TriggerResult::Playing);
        world.update(0.016);
        assert!(world.poll_events().is_empty());

        world.set_listener_transformation(near, at(40.0));
        world.set_listener_transformation(far, at(50.0));
        world.update(0.016);
        world.update(0.016);

        assert!(world.object(object).unwrap().is_virtual());
        assert_eq!(world.poll_events(), vec![BridgeEvent::ObjectVirtualized { object }]);
    }

    #[test]
    fn test_trigger_outlives_destruct_until_last_instance() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();
        assert_eq!(world.trigger(trigger).unwrap().instance_count(), 0);

        world.execute_trigger(object, trigger, 1);
        world.execute_trigger(object, trigger, 2);
        assert_eq!(world.trigger(trigger).unwrap().instance_count(), 2);

        assert!(world.destruct_trigger(trigger).is_success());
        assert!(world.trigger(trigger).unwrap().is_pending_destruction());

        let playing = backend.playing_ids();
        backend.finish_event(playing[1]);
        world.update(0.016);
        assert_eq!(world.trigger(trigger).unwrap().instance_count(), 1);

        backend.finish_event(playing[0]);
        world.update(0.016);
        assert!(world.trigger(trigger).is_none());
        assert_eq!(world.pool_stats().triggers.constructed, 0);
    }

    #[test]
    fn test_pending_trigger_cannot_be_executed() {
        let (_backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();
        world.execute_trigger(object, trigger, 1);
        world.destruct_trigger(trigger);

        assert_eq!(world.execute_trigger(object, trigger, 2), TriggerResult::Failure);
    }

    #[test]
    fn test_each_finished_instance_reported_once() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::named("Play_Loop")).unwrap();
        world.execute_trigger(object, trigger, 11);
        world.execute_trigger(object, trigger, 12);

        assert_eq!(backend.finish_all(), 2);
        world.update(0.016);
        world.update(0.016);

        let mut finished: Vec<TriggerInstanceId> = world
            .poll_events()
            .into_iter()
            .filter_map(|event| match event {
                BridgeEvent::TriggerInstanceFinished {
                    trigger_instance_id,
                    ..
                } => Some(trigger_instance_id),
                _ => None,
            })
            .collect();
        finished.sort();
        assert_eq!(finished, vec![11, 12]);
        assert_eq!(world.pool_stats().event_instances.constructed, 0);
    }

    #[test]
    fn test_stop_trigger_completes_on_render() {
        let (backend, mut world) = world_with(BridgeDesc::default().with_stop_fade_ms(25));
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();
        world.execute_trigger(object, trigger, 1);

        assert!(world.stop_trigger(object, trigger).is_success());
        assert!(
            backend
                .calls()
                .iter()
                .any(|call| matches!(call, BackendCall::StopPlayingId { fade_ms: 25, .. }))
        );

        // The first update renders the stop, the second one observes it.
        world.update(0.016);
        world.update(0.016);
        assert!(world.object(object).unwrap().event_instances().is_empty());
    }

    #[test]
    fn test_named_trigger_uses_max_attenuation() {
        let (_backend, mut world) = world_with(BridgeDesc::default());
        world.set_max_attenuations([("Play_Waterfall", 25.0)]);

        let trigger = world
            .construct_trigger(&TriggerInfo::named("play_waterfall"))
            .unwrap();
        let unknown = world.construct_trigger(&TriggerInfo::named("Play_Other")).unwrap();

        assert_eq!(world.trigger(trigger).unwrap().max_attenuation_radius(), 25.0);
        assert_eq!(world.trigger(unknown).unwrap().max_attenuation_radius(), 0.0);
    }

    #[test]
    fn test_destruct_object_releases_instances() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();
        world.execute_trigger(object, trigger, 1);
        let game_object_id = world.object(object).unwrap().game_object_id();

        assert!(world.destruct_object(object).is_success());
        assert!(!backend.is_registered(game_object_id));
        assert_eq!(world.trigger(trigger).unwrap().instance_count(), 0);
        assert_eq!(world.poll_events(), vec![BridgeEvent::TriggerInstanceFinished {
            object,
            trigger_instance_id: 1
        }]);

        assert_eq!(world.destruct_object(object), RequestStatus::Failure);
        assert_eq!(world.destruct_object(world.global_object()), RequestStatus::Failure);
    }

    #[test]
    fn test_global_parameter_has_no_object() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let parameter = world
            .construct_parameter(&ParameterInfo::new("time_of_day").with_scaling(0.5, 0.0))
            .unwrap();

        assert!(world.set_global_parameter(parameter, 10.0).is_success());
        assert_eq!(backend.parameter(unique_id("time_of_day"), None), Some(5.0));

        world.destruct_parameter(parameter);
        assert_eq!(world.set_global_parameter(parameter, 1.0), RequestStatus::Failure);
    }

    #[test]
    fn test_global_switch_state() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let state = world
            .construct_switch_state(&SwitchStateInfo::state("music", "calm"))
            .unwrap();

        assert!(world.set_global_switch_state(state).is_success());
        assert!(backend.calls().contains(&BackendCall::SetState {
            group: unique_id("music"),
            state: unique_id("calm"),
        }));
    }

    #[test]
    fn test_environment_flushed_before_execution() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let cave = world.construct_environment(&EnvironmentInfo::aux_bus("cave")).unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();

        world.set_environment(object, cave, 0.75);
        world.execute_trigger(object, trigger, 1);

        let game_object_id = world.object(object).unwrap().game_object_id();
        let calls = backend.calls();
        let sends = calls
            .iter()
            .position(|call| matches!(call, BackendCall::SetAuxSends { .. }))
            .unwrap();
        let post = calls
            .iter()
            .position(|call| matches!(call, BackendCall::PostEvent { .. }))
            .unwrap();
        assert!(sends < post);
        assert_eq!(backend.aux_sends(game_object_id)[0].amount, 0.75);
    }

    #[test]
    fn test_relative_velocity_from_moving_listener() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let listener = world.construct_listener(at(0.0), "camera").unwrap();
        let object = world.construct_object(at(10.0), "emitter").unwrap();
        world.toggle_functionality(object, ObjectFunctionality::TrackRelativeVelocity, true);

        world.set_listener_transformation(listener, at(1.0));
        world.update(0.1);

        let game_object_id = world.object(object).unwrap().game_object_id();
        let relative = backend
            .parameter(crate::object::RELATIVE_VELOCITY_PARAMETER_ID, Some(game_object_id))
            .unwrap();
        assert!((relative - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_relative_velocity_settles_to_zero_after_listener_stops() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let listener = world.construct_listener(at(0.0), "camera").unwrap();
        let object = world.construct_object(at(10.0), "emitter").unwrap();
        world.toggle_functionality(object, ObjectFunctionality::TrackRelativeVelocity, true);

        world.set_listener_transformation(listener, at(1.0));
        world.update(0.1);
        for _ in 0..200 {
            world.update(0.01);
        }

        assert!(!world.listener(listener).unwrap().is_moving_or_decaying());
        let game_object_id = world.object(object).unwrap().game_object_id();
        assert_eq!(
            backend.parameter(crate::object::RELATIVE_VELOCITY_PARAMETER_ID, Some(game_object_id)),
            Some(0.0)
        );
    }

    #[test]
    fn test_rejected_listener_leaves_no_entry() {
        let (backend, mut world) = world_with(BridgeDesc::default());

        backend.set_failing(BackendOperation::RegisterGameObject, true);
        let result = world.construct_listener(at(0.0), "camera");
        assert!(matches!(result, Err(BridgeError::Backend(_))));
        assert_eq!(world.pool_stats().listeners.constructed, 0);

        backend.set_failing(BackendOperation::RegisterGameObject, false);
        backend.set_failing(BackendOperation::SetDefaultListener, true);
        let result = world.construct_listener(at(0.0), "camera");
        assert!(matches!(result, Err(BridgeError::Backend(_))));
        assert_eq!(world.pool_stats().listeners.constructed, 0);
        assert!(!backend.is_registered(GameObjectId(3)));

        backend.set_failing(BackendOperation::SetDefaultListener, false);
        let listener = world.construct_listener(at(0.0), "camera").unwrap();
        let game_object_id = world.listener(listener).unwrap().game_object_id();
        assert_eq!(game_object_id, GameObjectId(3));
        assert_eq!(backend.default_listener(), Some(game_object_id));
    }

    #[test]
    fn test_default_listener_handed_over_on_destruct() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let first = world.construct_listener(at(0.0), "first").unwrap();
        let second = world.construct_listener(at(5.0), "second").unwrap();
        let first_id = world.listener(first).unwrap().game_object_id();
        let second_id = world.listener(second).unwrap().game_object_id();
        assert_eq!(backend.default_listener(), Some(first_id));

        assert!(world.destruct_listener(first).is_success());
        assert_eq!(backend.default_listener(), Some(second_id));

        // Later listeners do not take over while a default exists.
        let third = world.construct_listener(at(9.0), "third").unwrap();
        assert_eq!(backend.default_listener(), Some(second_id));

        assert!(world.destruct_listener(second).is_success());
        let third_id = world.listener(third).unwrap().game_object_id();
        assert_eq!(backend.default_listener(), Some(third_id));
    }

    #[test]
    fn test_rename_listener_failure_is_reported() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let listener = world.construct_listener(at(0.0), "camera").unwrap();

        backend.set_failing(BackendOperation::RegisterGameObject, true);
        assert!(!world.set_listener_name(listener, "player").is_success());

        backend.set_failing(BackendOperation::RegisterGameObject, false);
        assert!(world.set_listener_name(listener, "player").is_success());
        assert_eq!(world.listener(listener).unwrap().name(), "player");
    }

    #[test]
    fn test_language_selects_localized_bank_folder() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        assert_eq!(world.language(), "english");
        assert_eq!(
            backend.language_folder().as_deref(),
            Some("localization/english/audio/wwise")
        );

        let voice = world.construct_file(&FileInfo::localized("Voice.bnk")).unwrap();
        let music = world.construct_file(&FileInfo::new("Music.bnk")).unwrap();

        assert!(world.set_language("german").is_success());
        assert_eq!(
            backend.language_folder().as_deref(),
            Some("localization/german/audio/wwise")
        );
        assert_eq!(
            world.file_location(voice).as_deref(),
            Some("localization/german/audio/wwise/Voice.bnk")
        );

        assert!(world.load_file(voice).is_success());
        assert!(world.load_file(music).is_success());
        assert!(!world.load_file(music).is_success());

        let banks = backend.loaded_banks();
        assert!(banks.contains(&"localization/german/audio/wwise/Voice.bnk".to_string()));
        assert!(banks.contains(&"audio/wwise/Music.bnk".to_string()));

        assert!(world.destruct_file(voice).is_success());
        assert!(
            !backend
                .loaded_banks()
                .contains(&"localization/german/audio/wwise/Voice.bnk".to_string())
        );
    }

    #[test]
    fn test_failed_language_change_keeps_previous() {
        let (backend, mut world) = world_with(BridgeDesc::default().with_language("french"));
        backend.set_failing(BackendOperation::SetLanguageFolder, true);

        assert!(!world.set_language("german").is_success());
        assert_eq!(world.language(), "french");
        assert_eq!(
            backend.language_folder().as_deref(),
            Some("localization/french/audio/wwise")
        );
    }

    #[test]
    fn test_panning_rule_forwarded() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        assert_eq!(backend.panning_rule(), PanningRule::Speakers);

        assert!(world.set_panning_rule(PanningRule::Headphones).is_success());
        assert_eq!(backend.panning_rule(), PanningRule::Headphones);

        backend.set_failing(BackendOperation::SetPanningRule, true);
        assert!(!world.set_panning_rule(PanningRule::Speakers).is_success());
        assert_eq!(backend.panning_rule(), PanningRule::Headphones);
    }

    #[test]
    fn test_destruct_listener_detaches_objects() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let listener = world.construct_listener(at(5.0), "camera").unwrap();
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let game_object_id = world.listener(listener).unwrap().game_object_id();

        assert!(world.destruct_listener(listener).is_success());
        assert!(world.object(object).unwrap().listener_associations().is_empty());
        assert_eq!(world.object(object).unwrap().shortest_distance_to_listener(), 0.0);
        assert!(!backend.is_registered(game_object_id));
    }

    #[test]
    fn test_bank_operations_use_aux_thread_without_internal_thread() {
        let (backend, mut world) = world_with(BridgeDesc::default().with_internal_thread(false));
        let file = world.construct_file(&FileInfo::new("Level.bnk")).unwrap();

        assert!(world.register_in_memory_file(file, &[0u8; 64]).is_success());
        assert!(world.file(file).unwrap().bank().is_some());

        assert!(world.unregister_in_memory_file(file).is_success());
        assert!(world.file(file).unwrap().bank().is_none());
        assert!(!backend.is_rendering());

        assert!(world.on_refresh().is_success());
        assert_eq!(backend.loaded_banks(), vec!["Init.bnk".to_string()]);

        world.shutdown().unwrap();
        assert!(backend.loaded_banks().is_empty());
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_shutdown_is_idempotent_and_cancels_callbacks() {
        let (backend, mut world) = world_with(BridgeDesc::default());
        let object = world.construct_object(at(0.0), "emitter").unwrap();
        let trigger = world.construct_trigger(&TriggerInfo::raw(7, 0.0)).unwrap();
        world.execute_trigger(object, trigger, 1);

        world.shutdown().unwrap();
        world.shutdown().unwrap();
        assert!(world.is_shut_down());
        assert!(backend.playing_ids().is_empty());
        assert!(
            backend
                .calls()
                .iter()
                .any(|call| matches!(call, BackendCall::CancelEventCallbacks { .. }))
        );
    }

    #[test]
    fn test_pool_stats_track_construction() {
        let (_backend, mut world) = world_with(BridgeDesc::default().with_listener_pool_size(3));
        world.construct_listener(at(0.0), "a").unwrap();

        let stats = world.pool_stats();
        assert_eq!(stats.listeners, PoolStats {
            constructed: 1,
            capacity: 3
        });
        assert_eq!(stats.objects.constructed, 1);
    }
}
