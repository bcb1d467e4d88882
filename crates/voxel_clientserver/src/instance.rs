//! Client, server and unified instances.
//!
//! An instance owns a registry, a system manager, a delayed event
//! dispatcher, a validator and a set of connections. Its per-tick sequence:
//!
//! 1. drain socket events (identity exchange, frame routing, lifecycle);
//! 2. process inbound messages against the registry;
//! 3. dispatch pending events;
//! 4. run the scheduler (the synchronization systems fill the outbox);
//! 5. flush the outbox to the connections, batching with `COMPOUND`;
//! 6. apply the deferred command buffer.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use voxel_ecs::{CommandBuffer, Component, ComponentTypeId, Entity, Registry};
use voxel_events::DelayedEventDispatcher;
use voxel_net::{
    kind, CompoundBody, Message, Session, SessionConfig, SessionErrorKind, SessionEvent,
    SessionId, SocketClient, SocketServer,
};
use voxel_schedule::{
    markers, AccessSet, SchedulerConfig, System, SystemDescriptor, SystemId, SystemManager, Tick,
    TickTiming,
};

use crate::connection::{Connection, RemoteConnection};
use crate::error::SyncError;
use crate::messages::{
    AddEntityBody, DelEntityBody, IdentityBody, PartialSyncBody, SetComponentBody,
    UndoComponentBody,
};
use crate::partial::{self, MessageTypeId, PartialMessage, PartiallySynchronizable};
use crate::remote_init::RemoteInitRegistry;
use crate::sync::SyncState;
use crate::synchronizer::{SyncedComponents, SynchronizerState};
use crate::validator::{ChangeResult, ChangeValidator};
use crate::visibility::{VisibilityRule, VisibilityState};

/// Globally unique instance identifier, exchanged before any handler is
/// installed.
pub type InstanceId = Uuid;

/// What side of the authority relationship an instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    /// Mirrors server state; its component edits are optimistic.
    Client,
    /// The authority: validates inbound edits, owns entity lifecycles.
    Server,
    /// A single-process instance acting as both.
    Unified,
}

/// Dispatched when a remote's identity is known and its connection is
/// installed.
#[derive(Debug, Clone, Copy)]
pub struct RemoteConnectedEvent {
    /// The remote's instance ID.
    pub remote: InstanceId,
}

/// Dispatched when a remote's connection is removed.
#[derive(Debug, Clone, Copy)]
pub struct RemoteDisconnectedEvent {
    /// The remote's instance ID.
    pub remote: InstanceId,
}

/// Dispatched for every session-level error.
#[derive(Debug, Clone, Copy)]
pub struct SessionErrorEvent {
    /// The failing session.
    pub session: SessionId,
    /// The error code.
    pub kind: SessionErrorKind,
}

/// Instance construction options.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    /// Tick timing parameters.
    pub timing: TickTiming,
    /// Scheduler strategy and worker count.
    pub scheduler: SchedulerConfig,
    /// Session parameters for remote connections.
    pub session: SessionConfig,
}

/// A client, server or unified endpoint.
pub struct Instance {
    id: InstanceId,
    role: InstanceRole,
    registry: Registry,
    manager: SystemManager,
    dispatcher: DelayedEventDispatcher,
    validator: ChangeValidator,
    remote_init: RemoteInitRegistry,
    connections: HashMap<InstanceId, Box<dyn Connection>>,
    session_to_remote: HashMap<SessionId, InstanceId>,
    pending_sessions: HashSet<SessionId>,
    sync: Arc<Mutex<SyncState>>,
    commands: Arc<Mutex<CommandBuffer>>,
    observers: HashMap<u16, Vec<Arc<dyn Fn(InstanceId, &Message) + Send + Sync>>>,
    server_socket: Option<SocketServer>,
    client_socket: Option<SocketClient>,
    session_config: SessionConfig,
    visibility_system: Option<SystemId>,
    synchronizer_system: Option<SystemId>,
}

impl Instance {
    /// Creates an instance with the given role and configuration.
    #[must_use]
    pub fn new(role: InstanceRole, config: InstanceConfig) -> Self {
        let id = Uuid::new_v4();
        info!(%id, ?role, "instance created");
        Self {
            id,
            role,
            registry: Registry::new(),
            manager: SystemManager::new(config.scheduler, config.timing),
            dispatcher: DelayedEventDispatcher::new(),
            validator: ChangeValidator::new(),
            remote_init: RemoteInitRegistry::new(),
            connections: HashMap::new(),
            session_to_remote: HashMap::new(),
            pending_sessions: HashSet::new(),
            sync: Arc::new(Mutex::new(SyncState::default())),
            commands: Arc::new(Mutex::new(CommandBuffer::new())),
            observers: HashMap::new(),
            server_socket: None,
            client_socket: None,
            session_config: config.session,
            visibility_system: None,
            synchronizer_system: None,
        }
    }

    /// Creates a client instance with default configuration.
    #[must_use]
    pub fn client() -> Self {
        Self::new(InstanceRole::Client, InstanceConfig::default())
    }

    /// Creates a server instance with default configuration.
    #[must_use]
    pub fn server() -> Self {
        Self::new(InstanceRole::Server, InstanceConfig::default())
    }

    /// Creates a unified instance with default configuration.
    #[must_use]
    pub fn unified() -> Self {
        Self::new(InstanceRole::Unified, InstanceConfig::default())
    }

    /// This instance's ID.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// This instance's role.
    #[must_use]
    pub fn role(&self) -> InstanceRole {
        self.role
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The registry, mutably.
    #[must_use]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The event dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &DelayedEventDispatcher {
        &self.dispatcher
    }

    /// The change validator.
    #[must_use]
    pub fn validator(&self) -> &ChangeValidator {
        &self.validator
    }

    /// The change validator, mutably.
    #[must_use]
    pub fn validator_mut(&mut self) -> &mut ChangeValidator {
        &mut self.validator
    }

    /// The remote initializer registry, mutably.
    #[must_use]
    pub fn remote_init_mut(&mut self) -> &mut RemoteInitRegistry {
        &mut self.remote_init
    }

    /// Shared handle to the per-tick deferred command buffer. Systems clone
    /// this to create or destroy entities at the tick barrier.
    #[must_use]
    pub fn commands(&self) -> Arc<Mutex<CommandBuffer>> {
        Arc::clone(&self.commands)
    }

    /// The current tick number.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.manager.tick()
    }

    // ── Entities ───────────────────────────────────────────────────────

    /// Creates an entity.
    pub fn create_entity(&mut self) -> Entity {
        self.registry.create_entity()
    }

    /// Creates an entity carrying one component.
    pub fn create_entity_with<C: Component>(&mut self, component: C) -> Entity {
        let entity = self.registry.create_entity();
        self.registry.emplace(entity, component);
        entity
    }

    /// Destroys an entity, queueing it for the next visibility pass so
    /// remotes observe it going invisible.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.registry.destroy_entity(entity) {
            return false;
        }
        let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
        sync.note_destroyed(entity);
        true
    }

    /// Returns a reference to an entity's component, if present.
    #[must_use]
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.registry.get(entity)
    }

    /// Returns a mutable reference to an entity's component, if present.
    #[must_use]
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        self.registry.get_mut(entity)
    }

    // ── Systems ────────────────────────────────────────────────────────

    /// Registers a system with the scheduler.
    pub fn add_system(
        &mut self,
        descriptor: SystemDescriptor,
        system: impl System + 'static,
    ) -> SystemId {
        self.manager.add_system(descriptor, system)
    }

    /// Removes a system from the scheduler.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        self.manager.remove_system(id)
    }

    /// Installs (or replaces) the visibility rule and ensures the
    /// visibility system is registered. An instance carries at most one
    /// rule; the returned ID identifies the system for dependencies.
    pub fn set_visibility_rule(&mut self, rule: VisibilityRule) -> SystemId {
        {
            let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            match sync.visibility.as_mut() {
                Some(visibility) => visibility.set_rule(rule),
                None => sync.visibility = Some(VisibilityState::new(rule)),
            }
        }

        if let Some(id) = self.visibility_system {
            return id;
        }
        let sync = Arc::clone(&self.sync);
        let id = self.manager.add_system(
            SystemDescriptor::new("entity_visibility")
                .with_access(AccessSet::new().write(markers::CONNECTIONS)),
            move |registry: &mut Registry, _tick: &Tick| {
                let mut sync = sync.lock().unwrap_or_else(|e| e.into_inner());
                sync.run_visibility(registry);
            },
        );
        self.visibility_system = Some(id);
        id
    }

    /// Installs the synchronizer for a set of component types, registering
    /// their pools and, if necessary, an always-visible visibility rule.
    pub fn add_synchronizer(&mut self, components: SyncedComponents) -> SystemId {
        let vis_id = match self.visibility_system {
            Some(id) => id,
            None => self.set_visibility_rule(Arc::new(|_, _, _| true)),
        };
        components.register_pools(&mut self.registry);
        {
            let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            sync.synchronizer = Some(SynchronizerState::new(
                components.type_ids(),
                components.tag_ids(),
            ));
        }

        if let Some(id) = self.synchronizer_system {
            return id;
        }
        let mut access = AccessSet::new().write(markers::CONNECTIONS);
        for type_id in components
            .type_ids()
            .into_iter()
            .chain(components.tag_ids())
        {
            access = access.read(type_id);
        }
        let sync = Arc::clone(&self.sync);
        let id = self.manager.add_system(
            SystemDescriptor::new("component_synchronizer")
                .with_access(access)
                .after(vis_id),
            move |registry: &mut Registry, _tick: &Tick| {
                let mut sync = sync.lock().unwrap_or_else(|e| e.into_inner());
                sync.run_synchronizer(registry, Instant::now());
            },
        );
        self.synchronizer_system = Some(id);
        id
    }

    /// Sets the minimum interval between synchronizer sends of one
    /// component type.
    pub fn set_sync_rate(&mut self, component: ComponentTypeId, rate: Duration) {
        let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(synchronizer) = sync.synchronizer.as_mut() {
            synchronizer.set_rate(component, rate);
        }
    }

    /// The component types the synchronizer replicates.
    #[must_use]
    pub fn synced_component_types(&self) -> Vec<ComponentTypeId> {
        let sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
        sync.synchronizer
            .as_ref()
            .map(|s| s.types().to_vec())
            .unwrap_or_default()
    }

    /// Marks every synchronized component with one validator verdict, as an
    /// authority typically does right after installing the synchronizer.
    pub fn set_default_for_synced_components(&mut self, result: ChangeResult) {
        let types = self.synced_component_types();
        self.validator.set_for_components(&types, result);
    }

    // ── Partial synchronization ────────────────────────────────────────

    /// Registers a partially synchronizable component type: its pool and,
    /// eagerly, all of its message handlers.
    pub fn register_partial_component<C: PartiallySynchronizable>(&mut self) {
        self.registry.register::<C>();
        C::register_messages();
    }

    /// Sends a component-specific message to one remote.
    pub fn send_partial_message<C, M>(
        &mut self,
        remote: InstanceId,
        entity: Entity,
        message: &M,
    ) -> Result<(), SyncError>
    where
        C: PartiallySynchronizable,
        M: PartialMessage,
    {
        let body = PartialSyncBody {
            component_type: ComponentTypeId::of::<C>(),
            message_type: MessageTypeId::of::<M>(),
            entity,
            data: voxel_net::codec::encode(message)?,
        };
        self.send_message(remote, Message::new(kind::PARTIAL_SYNC, &body)?)
    }

    /// Sends a component-specific message to every remote the entity is
    /// visible on (every remote if no visibility rule is installed).
    pub fn broadcast_partial_message<C, M>(
        &mut self,
        entity: Entity,
        message: &M,
    ) -> Result<(), SyncError>
    where
        C: PartiallySynchronizable,
        M: PartialMessage,
    {
        for remote in self.visible_remotes(entity) {
            self.send_partial_message::<C, M>(remote, entity, message)?;
        }
        Ok(())
    }

    /// The remotes an entity is currently visible on; every connected
    /// remote if no visibility rule is installed.
    #[must_use]
    pub fn visible_remotes(&self, entity: Entity) -> Vec<InstanceId> {
        let sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
        match sync.visibility.as_ref() {
            Some(visibility) => self
                .connections
                .keys()
                .copied()
                .filter(|&remote| visibility.is_visible(entity, remote))
                .collect(),
            None => self.connections.keys().copied().collect(),
        }
    }

    // ── Connections ────────────────────────────────────────────────────

    /// Installs a wired connection, replacing any existing one to the same
    /// remote.
    pub fn add_connection(&mut self, connection: Box<dyn Connection>) {
        let remote = connection.remote_id();
        debug!(%remote, "connection installed");
        self.connections.insert(remote, connection);
        self.dispatcher.enqueue(RemoteConnectedEvent { remote });
    }

    /// Returns `true` if a connection to the remote exists.
    #[must_use]
    pub fn has_connection(&self, remote: InstanceId) -> bool {
        self.connections.contains_key(&remote)
    }

    /// The IDs of all connected remotes.
    #[must_use]
    pub fn connected_remotes(&self) -> Vec<InstanceId> {
        self.connections.keys().copied().collect()
    }

    /// Removes the connection to a remote, stopping its session if any.
    pub fn disconnect(&mut self, remote: InstanceId) -> bool {
        if self.connections.remove(&remote).is_none() {
            return false;
        }
        let sessions: Vec<SessionId> = self
            .session_to_remote
            .iter()
            .filter(|(_, &r)| r == remote)
            .map(|(&sid, _)| sid)
            .collect();
        for sid in sessions {
            self.session_to_remote.remove(&sid);
            if let Some(session) = self.session_handle(sid) {
                session.stop();
            }
        }
        {
            let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            sync.forget_remote(remote);
        }
        self.dispatcher.enqueue(RemoteDisconnectedEvent { remote });
        true
    }

    /// Queues a message for one remote, bypassing the outbox.
    pub fn send_message(
        &mut self,
        remote: InstanceId,
        message: Message,
    ) -> Result<(), SyncError> {
        match self.connections.get_mut(&remote) {
            Some(connection) => {
                connection.send_message(message);
                Ok(())
            }
            None => Err(SyncError::UnknownRemote(remote)),
        }
    }

    /// Registers an observer invoked for every inbound message of one kind,
    /// in addition to (and before) the engine's own handling.
    pub fn add_raw_handler(
        &mut self,
        message_kind: u16,
        handler: impl Fn(InstanceId, &Message) + Send + Sync + 'static,
    ) {
        self.observers
            .entry(message_kind)
            .or_default()
            .push(Arc::new(handler));
    }

    // ── Remote sockets ─────────────────────────────────────────────────

    /// Starts accepting remote clients. Returns the bound address.
    pub fn host(&mut self, addr: &str) -> Result<SocketAddr, SyncError> {
        let server = SocketServer::start(addr, self.session_config.clone())?;
        let local = server.local_addr();
        info!(%local, "hosting");
        self.server_socket = Some(server);
        Ok(local)
    }

    /// Connects to a hosting instance.
    pub fn connect_to(&mut self, addr: &str) -> Result<(), SyncError> {
        let client = SocketClient::connect(addr, self.session_config.clone())?;
        self.client_socket = Some(client);
        Ok(())
    }

    /// Stops hosting and disconnects every session-backed remote.
    pub fn stop_hosting(&mut self) {
        let remotes: Vec<InstanceId> = self.session_to_remote.values().copied().collect();
        for remote in remotes {
            self.disconnect(remote);
        }
        if let Some(server) = self.server_socket.take() {
            server.stop();
        }
        if let Some(client) = self.client_socket.take() {
            client.stop();
        }
    }

    // ── Tick ───────────────────────────────────────────────────────────

    /// Runs one tick: see the module docs for the exact sequence.
    pub fn update(&mut self) -> Result<(), SyncError> {
        self.pump_sockets();
        self.process_inbound();
        self.dispatcher.dispatch_pending();

        {
            let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            sync.remotes = self.connections.keys().copied().collect();
        }
        self.manager.update(&mut self.registry)?;
        self.flush_outbox();

        let mut commands = {
            let mut held = self.commands.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *held)
        };
        commands.apply(&mut self.registry);

        Ok(())
    }

    fn session_handle(&self, id: SessionId) -> Option<Arc<Session>> {
        if let Some(server) = &self.server_socket {
            if let Some(session) = server.session(id) {
                return Some(session);
            }
        }
        if let Some(client) = &self.client_socket {
            if client.session().id() == id {
                return Some(Arc::clone(client.session()));
            }
        }
        None
    }

    fn pump_sockets(&mut self) {
        let mut events = Vec::new();
        if let Some(server) = &self.server_socket {
            events.extend(server.update());
        }
        if let Some(client) = &self.client_socket {
            events.extend(client.update());
        }
        for event in events {
            self.handle_session_event(event);
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Started(sid) => {
                // First frame each way is our identity inside an IGNORE
                // message, sent before any handler exists.
                let Some(session) = self.session_handle(sid) else {
                    return;
                };
                match Message::new(
                    kind::IGNORE,
                    &IdentityBody {
                        instance_id: self.id,
                    },
                ) {
                    Ok(message) => session.write(message.to_bytes()),
                    Err(error) => warn!(%error, "failed to encode identity"),
                }
                self.pending_sessions.insert(sid);
            }
            SessionEvent::MessageReceived(sid, bytes) => {
                let message = match Message::from_bytes(&bytes) {
                    Ok(message) => message,
                    Err(_) => {
                        warn!(session = sid, "malformed frame; closing session");
                        if let Some(session) = self.session_handle(sid) {
                            session.stop();
                        }
                        return;
                    }
                };

                if self.pending_sessions.contains(&sid) {
                    let identity: IdentityBody = match message.decode_body() {
                        Ok(identity) => identity,
                        Err(_) => {
                            warn!(session = sid, "bad identity frame; closing session");
                            if let Some(session) = self.session_handle(sid) {
                                session.stop();
                            }
                            return;
                        }
                    };
                    self.pending_sessions.remove(&sid);
                    let Some(session) = self.session_handle(sid) else {
                        return;
                    };
                    let remote = identity.instance_id;
                    info!(%remote, session = sid, "remote identified");
                    self.session_to_remote.insert(sid, remote);
                    self.connections
                        .insert(remote, Box::new(RemoteConnection::new(remote, session)));
                    self.dispatcher.enqueue(RemoteConnectedEvent { remote });
                } else if let Some(&remote) = self.session_to_remote.get(&sid) {
                    if let Some(connection) = self.connections.get_mut(&remote) {
                        connection.push_inbound(message);
                    }
                } else {
                    warn!(session = sid, "frame from unmapped session");
                }
            }
            SessionEvent::Error(sid, error_kind) => {
                self.dispatcher.enqueue(SessionErrorEvent {
                    session: sid,
                    kind: error_kind,
                });
            }
            SessionEvent::Ended(sid) => {
                self.pending_sessions.remove(&sid);
                if let Some(remote) = self.session_to_remote.remove(&sid) {
                    self.connections.remove(&remote);
                    let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
                    sync.forget_remote(remote);
                    drop(sync);
                    self.dispatcher.enqueue(RemoteDisconnectedEvent { remote });
                }
            }
        }
    }

    fn process_inbound(&mut self) {
        let batches: Vec<(InstanceId, Vec<Message>)> = self
            .connections
            .iter_mut()
            .map(|(&remote, connection)| (remote, connection.drain_inbound()))
            .collect();

        for (remote, messages) in batches {
            for message in messages {
                if let Err(error) = self.handle_message(remote, &message) {
                    warn!(%remote, %error, "protocol violation; disconnecting peer");
                    self.disconnect(remote);
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, remote: InstanceId, message: &Message) -> Result<(), SyncError> {
        if let Some(handlers) = self.observers.get(&message.kind) {
            let handlers = handlers.clone();
            for handler in handlers {
                handler(remote, message);
            }
        }

        match message.kind {
            kind::IGNORE => Ok(()),
            kind::ADD_ENTITY => {
                let body: AddEntityBody = message.decode_body()?;
                if self.role != InstanceRole::Client {
                    // Only the authority creates entities; a client cannot
                    // push mirrors at us.
                    return Ok(());
                }
                for init in body.entities {
                    if self.registry.create_entity_with_id(init.entity) {
                        let registry = &mut self.registry;
                        self.remote_init
                            .run(registry, init.entity, remote, &init.components);
                    }
                }
                Ok(())
            }
            kind::DEL_ENTITY => {
                let body: DelEntityBody = message.decode_body()?;
                if self.role != InstanceRole::Client {
                    return Ok(());
                }
                for entity in body.entities {
                    if self.registry.destroy_entity(entity) {
                        let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
                        sync.note_destroyed(entity);
                    }
                }
                Ok(())
            }
            kind::SET_COMPONENT => {
                let body: SetComponentBody = message.decode_body()?;
                self.handle_set_component(remote, body)
            }
            kind::UNDO_COMPONENT => {
                let body: UndoComponentBody = message.decode_body()?;
                // Authoritative revert: apply unconditionally.
                self.apply_component(remote, body.component_type, body.entity, &body.data)
            }
            kind::PARTIAL_SYNC => {
                let body: PartialSyncBody = message.decode_body()?;
                partial::dispatch_partial_message(
                    &mut self.registry,
                    body.component_type,
                    body.message_type,
                    body.entity,
                    remote,
                    &body.data,
                )
            }
            kind::COMPOUND => {
                let body: CompoundBody = message.decode_body()?;
                for inner in &body.messages {
                    self.handle_message(remote, inner)?;
                }
                Ok(())
            }
            unknown if unknown < kind::USER_START => Err(SyncError::Protocol(format!(
                "unknown engine message kind {unknown}"
            ))),
            _ => Ok(()), // user kinds are observer-only
        }
    }

    fn handle_set_component(
        &mut self,
        remote: InstanceId,
        body: SetComponentBody,
    ) -> Result<(), SyncError> {
        if self.role == InstanceRole::Client {
            // The server is authoritative over mirrored state.
            return self.apply_component(remote, body.component_type, body.entity, &body.data);
        }

        // The authority never reveals anything about state the remote
        // cannot see: unknown entities, unknown component types and
        // invisible entities are dropped without a response.
        if !self.registry.is_alive(body.entity) {
            return Ok(());
        }
        {
            let sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(visibility) = sync.visibility.as_ref() {
                if !visibility.is_visible(body.entity, remote) {
                    return Ok(());
                }
            }
        }
        if self.registry.any_pool(body.component_type).is_none() {
            return Ok(());
        }

        match self.validator.check(body.component_type, remote) {
            ChangeResult::Allowed => {
                self.apply_component(remote, body.component_type, body.entity, &body.data)
            }
            ChangeResult::Forbidden => {
                let authoritative = self
                    .registry
                    .any_pool(body.component_type)
                    .and_then(|pool| pool.serialize_value(body.entity).ok().flatten());
                if let Some(data) = authoritative {
                    let undo = UndoComponentBody {
                        component_type: body.component_type,
                        entity: body.entity,
                        data,
                    };
                    let message = Message::new(kind::UNDO_COMPONENT, &undo)?;
                    let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
                    sync.outbox.push((remote, message));
                }
                Ok(())
            }
            ChangeResult::Ignored => Ok(()),
        }
    }

    fn apply_component(
        &mut self,
        remote: InstanceId,
        component_type: ComponentTypeId,
        entity: Entity,
        data: &[u8],
    ) -> Result<(), SyncError> {
        if !self.registry.is_alive(entity) {
            return Ok(());
        }
        let Some(pool) = self.registry.any_pool_mut(component_type) else {
            debug!(?component_type, "value for unregistered component dropped");
            return Ok(());
        };
        pool.apply_serialized(entity, data)?;

        let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(synchronizer) = sync.synchronizer.as_mut() {
            synchronizer.note_applied(remote, entity, component_type, data, Instant::now());
        }
        Ok(())
    }

    fn flush_outbox(&mut self) {
        let outbox = {
            let mut sync = self.sync.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut sync.outbox)
        };
        if outbox.is_empty() {
            return;
        }

        let mut grouped: HashMap<InstanceId, Vec<Message>> = HashMap::new();
        for (remote, message) in outbox {
            grouped.entry(remote).or_default().push(message);
        }

        for (remote, mut messages) in grouped {
            let Some(connection) = self.connections.get_mut(&remote) else {
                continue;
            };
            if messages.len() == 1 {
                if let Some(message) = messages.pop() {
                    connection.send_message(message);
                }
            } else {
                // One atomic, ordered batch per remote per tick.
                match Message::new(kind::COMPOUND, &CompoundBody { messages }) {
                    Ok(message) => connection.send_message(message),
                    Err(error) => warn!(%error, "failed to encode compound batch"),
                }
            }
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.stop_hosting();
    }
}
