//! Station assembly.
//!
//! [`CellBuilder`] turns a [`StationConfig`] into a running [`Cell`]: it
//! resolves every I/O role of the layout, creates inboxes and publishers,
//! wires the subscriptions between actors, and only then spawns them, so no
//! publication made while starting is lost. Actors are spawned bottom-up,
//! devices first and the station last.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use modcell_common::io::image::{DirectionPair, Edge, EdgeCallback, ProcessImage};
use modcell_common::io::registry::{IoBinding, IoRegistry};
use modcell_common::io::role::IoRole;
use modcell_common::io::sim::SimulatedProcessImage;
use modcell_common::station::codes::ErrorCode;
use modcell_common::station::config::{Layout, StationConfig};
use tracing::{debug, error, info};

use super::STATION_TOPICS;
use super::control_loop::ControlLoop;
use super::supervisor::{ServiceTable, Station, StationDevices, StationSettings};
use crate::composite::carriage::{Carriage, CarriageDevices};
use crate::composite::dicehalf_rack::{DICEHALF_RACK_TOPICS, DicehalfRack, RackSensors};
use crate::composite::plate_rack::{PLATE_RACK_TOPICS, PlateRack, PlateRackSensors};
use crate::composite::press::{Press, PressDevices};
use crate::composite::stock::StockStore;
use crate::composite::COMPOSITE_TOPICS;
use crate::device::DEVICE_TOPICS;
use crate::device::blinker::{BlinkPattern, Blinker};
use crate::device::clamp::Clamp;
use crate::device::force::{FORCE_TOPICS, ForceSensor};
use crate::device::led::{RgbLed, RgbPins};
use crate::device::motor::Motor;
use crate::device::nfc::{NfcReader, SimulatedTagReader, TagReader};
use crate::device::sensor::Sensor;
use crate::error::{BuildError, PostError, PubSubError};
use crate::runtime::active::{ActiveObject, ActorRef, Behavior, Mailbox, mailbox};
use crate::runtime::message::{
    ActorId, DeviceId, Event, EventKind, Parameters, ServiceKind, StationCommand, Topic,
};
use crate::runtime::pubsub::{Callback, Publisher};
use crate::runtime::report::Reporter;
use crate::service::dicehalf::{DicehalfOp, DicehalfService};
use crate::service::homing::{HomingService, HomingTargets};
use crate::service::init::InitService;
use crate::service::material::{MaterialOp, MaterialService};
use crate::service::position::PositionService;
use crate::service::press::{PressJobTargets, PressService};
use crate::service::{INITIALIZE_SLOT, SERVICE_TOPICS, ServiceCore};

/// Device topics a composite listens to.
const DEVICE_REPORTS: &[Topic] = &[Topic::State, Topic::Value];
/// Station topics every composite listens to.
const STATION_SIGNALS: &[Topic] = &[Topic::StationState, Topic::Ack];

// ─── Cell ───────────────────────────────────────────────────────────

/// A running station: every actor of one layout plus the control loop.
pub struct Cell {
    layout: Layout,
    station: ActorRef,
    surface: Arc<Publisher>,
    refs: BTreeMap<ActorId, ActorRef>,
    publishers: BTreeMap<ActorId, Arc<Publisher>>,
    actors: Vec<ActiveObject>,
    control_loop: Option<ControlLoop>,
}

impl Cell {
    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn station(&self) -> &ActorRef {
        &self.station
    }

    /// Publisher of the station topics.
    pub fn surface(&self) -> &Arc<Publisher> {
        &self.surface
    }

    pub fn publisher(&self, id: ActorId) -> Option<&Arc<Publisher>> {
        self.publishers.get(&id)
    }

    pub fn publishers(&self) -> impl Iterator<Item = &Arc<Publisher>> {
        self.publishers.values()
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorRef> {
        self.refs.get(&id)
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.refs.keys().copied()
    }

    /// Post a station input as the supervisory system would.
    pub fn command(
        &self,
        command: StationCommand,
        parameters: Option<Parameters>,
    ) -> Result<(), PostError> {
        self.station.post(Event::new(
            EventKind::Command {
                command,
                parameters,
            },
            ActorId::Bridge,
        ))
    }

    /// Register `callback` on every topic of every publisher.
    pub fn observe(&self, callback: Callback) -> Result<(), PubSubError> {
        for publisher in self.publishers.values() {
            for topic in publisher.topics() {
                publisher.register(*topic, ActorId::Bridge, Arc::clone(&callback))?;
            }
        }
        Ok(())
    }

    /// Stop the control loop, then every actor, station first.
    pub async fn shutdown(self) {
        info!("Shutting down {:?} station", self.layout);
        if let Some(control_loop) = self.control_loop {
            control_loop.stop().await;
        }
        for actor in self.actors.into_iter().rev() {
            actor.stop().await;
        }
        info!("Station stopped");
    }
}

// ─── Builder ────────────────────────────────────────────────────────

pub struct CellBuilder {
    config: StationConfig,
    image: Arc<dyn ProcessImage>,
    tag_reader: Option<Arc<dyn TagReader>>,
}

impl CellBuilder {
    pub fn new(config: StationConfig, image: Arc<dyn ProcessImage>) -> Self {
        Self {
            config,
            image,
            tag_reader: None,
        }
    }

    /// Builder over a simulated process image laid out from `config.io`.
    pub fn simulated(
        config: StationConfig,
    ) -> Result<(Self, Arc<SimulatedProcessImage>), BuildError> {
        let registry = IoRegistry::from_config(&config.io)?;
        let image = SimulatedProcessImage::from_registry(&registry);
        Ok((Self::new(config, image.clone()), image))
    }

    /// NFC tag source. Defaults to an empty [`SimulatedTagReader`].
    pub fn with_tag_reader(mut self, reader: Arc<dyn TagReader>) -> Self {
        self.tag_reader = Some(reader);
        self
    }

    /// Assemble and spawn the station. Must run inside a tokio runtime.
    pub fn start(self) -> Result<Cell, BuildError> {
        self.config.validate()?;
        let registry = IoRegistry::from_config(&self.config.io)?;
        let tag_reader = self
            .tag_reader
            .unwrap_or_else(|| SimulatedTagReader::new() as Arc<dyn TagReader>);
        let mut w = Wiring::new(&self.config, registry, self.image, tag_reader);

        let shared = w.station_devices()?;
        let mut plan = match self.config.station.layout {
            Layout::Assembly => w.assembly(&shared.safety_publisher)?,
            Layout::Storage => w.storage()?,
        };
        let force = plan.force.take();
        w.station(shared, plan)?;
        Ok(w.finish(force))
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

/// Devices every layout has, driven by the station itself.
struct SharedDevices {
    led: ActorRef,
    blinker: ActorRef,
    safety: ActorRef,
    safety_publisher: Arc<Publisher>,
}

/// Layout-specific part of a station.
struct Plan {
    services: ServiceTable,
    /// Maintenance targets.
    press_motor: Option<ActorRef>,
    carriage: Option<ActorRef>,
    /// Composite publishers the station watches.
    composites: Vec<Arc<Publisher>>,
    force: Option<ForceInput>,
}

/// Force sensor input sampled by the control loop.
struct ForceInput {
    pin: String,
    target: ActorRef,
}

struct Wiring<'a> {
    config: &'a StationConfig,
    registry: IoRegistry,
    image: Arc<dyn ProcessImage>,
    tag_reader: Arc<dyn TagReader>,
    surface: Arc<Publisher>,
    reporter: Reporter,
    station: ActorRef,
    station_inbox: Option<Mailbox>,
    refs: BTreeMap<ActorId, ActorRef>,
    publishers: BTreeMap<ActorId, Arc<Publisher>>,
    pending: Vec<(Mailbox, Box<dyn Behavior>)>,
}

impl<'a> Wiring<'a> {
    fn new(
        config: &'a StationConfig,
        registry: IoRegistry,
        image: Arc<dyn ProcessImage>,
        tag_reader: Arc<dyn TagReader>,
    ) -> Self {
        let surface = Publisher::new(Station::ID, STATION_TOPICS);
        let (station, station_inbox) = mailbox(Station::ID, config.station.inbox_capacity);
        let mut refs = BTreeMap::new();
        refs.insert(Station::ID, station.clone());
        let mut publishers = BTreeMap::new();
        publishers.insert(Station::ID, Arc::clone(&surface));
        Self {
            config,
            registry,
            image,
            tag_reader,
            reporter: Reporter::new(Arc::clone(&surface), Station::ID),
            surface,
            station,
            station_inbox: Some(station_inbox),
            refs,
            publishers,
            pending: Vec::new(),
        }
    }

    fn inbox(&mut self, id: ActorId) -> (ActorRef, Mailbox) {
        let (actor, inbox) = mailbox(id, self.config.station.inbox_capacity);
        self.refs.insert(id, actor.clone());
        (actor, inbox)
    }

    fn publisher(&mut self, id: ActorId, topics: &[Topic]) -> Arc<Publisher> {
        let publisher = Publisher::new(id, topics);
        self.publishers.insert(id, Arc::clone(&publisher));
        publisher
    }

    fn add(&mut self, inbox: Mailbox, behavior: impl Behavior) {
        self.pending.push((inbox, Box::new(behavior)));
    }

    fn binding(&self, role: IoRole, peripheral: &str) -> Result<IoBinding, BuildError> {
        Ok(self.registry.require(&role, peripheral)?.clone())
    }

    /// Digital input sensor fed by edges of its line.
    fn sensor(
        &mut self,
        device: DeviceId,
        role: IoRole,
        peripheral: &str,
    ) -> Result<(ActorRef, Arc<Publisher>), BuildError> {
        let binding = self.binding(role, peripheral)?;
        let id = ActorId::Device(device);
        let (me, inbox) = self.inbox(id);
        let publisher = self.publisher(id, DEVICE_TOPICS);
        self.image.on_edge(&binding.pin, edge_forwarder(&me))?;
        let sensor = Sensor::new(
            id,
            Arc::clone(&publisher),
            Arc::clone(&self.image),
            binding.pin,
            binding.logic,
        );
        self.add(inbox, sensor);
        Ok((me, publisher))
    }

    fn motor(
        &mut self,
        device: DeviceId,
        cw: IoRole,
        ccw: IoRole,
        peripheral: &str,
    ) -> Result<(ActorRef, Arc<Publisher>, DirectionPair), BuildError> {
        let cw = self.binding(cw, peripheral)?;
        let ccw = self.binding(ccw, peripheral)?;
        let pair = DirectionPair::new(Arc::clone(&self.image), cw.pin, ccw.pin);
        let id = ActorId::Device(device);
        let (me, inbox) = self.inbox(id);
        let publisher = self.publisher(id, DEVICE_TOPICS);
        self.add(inbox, Motor::new(id, Arc::clone(&publisher), pair.clone()));
        Ok((me, publisher, pair))
    }

    /// Service inbox and core; the service hears the station's `Ack`.
    fn service(
        &mut self,
        kind: ServiceKind,
        timeout: Option<(Duration, ErrorCode)>,
    ) -> Result<(ActorRef, Mailbox, ServiceCore), BuildError> {
        let id = ActorId::Service(kind);
        let (me, inbox) = self.inbox(id);
        let publisher = self.publisher(id, SERVICE_TOPICS);
        self.surface.subscribe(Topic::Ack, &me)?;
        let mut core = ServiceCore::new(
            me.clone(),
            self.station.clone(),
            publisher,
            self.reporter.clone(),
        );
        if let Some((interval, code)) = timeout {
            core = core.with_timeout(interval, code);
        }
        Ok((me, inbox, core))
    }

    // ─── Station-owned devices ──────────────────────────────────────

    fn station_devices(&mut self) -> Result<SharedDevices, BuildError> {
        let (safety, safety_publisher) =
            self.sensor(DeviceId::SafetySwitch, IoRole::SafetySwitch, "safety switch")?;

        let pins = RgbPins {
            red: self.binding(IoRole::StatusLedRed, "status led")?.pin,
            green: self.binding(IoRole::StatusLedGreen, "status led")?.pin,
            blue: self.binding(IoRole::StatusLedBlue, "status led")?.pin,
        };
        let id = ActorId::Device(DeviceId::StatusLed);
        let (led, inbox) = self.inbox(id);
        let publisher = self.publisher(id, DEVICE_TOPICS);
        self.add(inbox, RgbLed::new(id, publisher, Arc::clone(&self.image), pins));

        let shutter = self.binding(IoRole::StatusShutter, "blinker")?.pin;
        let id = ActorId::Device(DeviceId::Blinker);
        let (blinker, inbox) = self.inbox(id);
        let publisher = self.publisher(id, DEVICE_TOPICS);
        let behavior = Blinker::new(
            blinker.clone(),
            publisher,
            Arc::clone(&self.image),
            shutter,
            self.blink_pattern(),
        );
        self.add(inbox, behavior);

        Ok(SharedDevices {
            led,
            blinker,
            safety,
            safety_publisher,
        })
    }

    fn blink_pattern(&self) -> BlinkPattern {
        BlinkPattern::continuous(
            Duration::from_millis(self.config.blink.on_ms),
            Duration::from_millis(self.config.blink.off_ms),
        )
    }

    // ─── Assembly layout ────────────────────────────────────────────

    fn assembly(&mut self, safety: &Arc<Publisher>) -> Result<Plan, BuildError> {
        let config = self.config;
        let timing = &config.timing;

        // Carriage
        let (front, front_pub) =
            self.sensor(DeviceId::FrontSensor, IoRole::CarriageFrontSensor, "carriage")?;
        let (rack, rack_pub) =
            self.sensor(DeviceId::RackSensor, IoRole::CarriageRackSensor, "carriage")?;
        let (motor, motor_pub, _) = self.motor(
            DeviceId::CarriageMotor,
            IoRole::CarriageMotorCw,
            IoRole::CarriageMotorCcw,
            "carriage",
        )?;
        let (carriage, inbox) = self.inbox(ActorId::Carriage);
        let carriage_pub = self.publisher(ActorId::Carriage, COMPOSITE_TOPICS);
        for p in [&front_pub, &rack_pub, &motor_pub] {
            p.subscribe_all(DEVICE_REPORTS, &carriage)?;
        }
        self.watch_station(&carriage, Some(safety))?;
        let behavior = Carriage::new(
            carriage.clone(),
            Arc::clone(&carriage_pub),
            self.reporter.clone(),
            CarriageDevices { front, rack, motor },
            timing.carriage_move(),
        );
        self.add(inbox, behavior);

        // Press
        let (upper, upper_pub) =
            self.sensor(DeviceId::UpperSensor, IoRole::PressUpperSensor, "press")?;
        let (end_switch, end_pub) =
            self.sensor(DeviceId::EndSwitch, IoRole::PressEndSwitch, "press")?;
        let (press_motor, press_motor_pub, pair) = self.motor(
            DeviceId::PressMotor,
            IoRole::PressMotorCw,
            IoRole::PressMotorCcw,
            "press",
        )?;
        let force_pin = self.binding(IoRole::PressForce, "press")?.pin;
        let id = ActorId::Device(DeviceId::ForceSensor);
        let (force, inbox) = self.inbox(id);
        let force_pub = self.publisher(id, FORCE_TOPICS);
        let sensor = ForceSensor::new(
            id,
            Arc::clone(&force_pub),
            Arc::clone(&self.image),
            force_pin.clone(),
            config.force.setpoint,
        )
        .with_motor_cut(pair);
        self.add(inbox, sensor);

        let (press, inbox) = self.inbox(ActorId::Press);
        let press_pub = self.publisher(ActorId::Press, COMPOSITE_TOPICS);
        for p in [&upper_pub, &end_pub, &force_pub, &press_motor_pub] {
            p.subscribe_all(DEVICE_REPORTS, &press)?;
        }
        self.watch_station(&press, Some(safety))?;
        let behavior = Press::new(
            press.clone(),
            Arc::clone(&press_pub),
            self.reporter.clone(),
            PressDevices {
                upper,
                end_switch,
                force: force.clone(),
                motor: press_motor.clone(),
            },
            timing.press_move(),
        );
        self.add(inbox, behavior);

        // Clamp, NFC and dispatch
        let clamp_pin = self.binding(IoRole::Clamp, "clamp")?.pin;
        let id = ActorId::Device(DeviceId::Clamp);
        let (clamp, inbox) = self.inbox(id);
        let clamp_pub = self.publisher(id, DEVICE_TOPICS);
        let behavior = Clamp::new(id, Arc::clone(&clamp_pub), Arc::clone(&self.image), clamp_pin);
        self.add(inbox, behavior);

        let id = ActorId::Device(DeviceId::Nfc);
        let (nfc, inbox) = self.inbox(id);
        let nfc_pub = self.publisher(id, DEVICE_TOPICS);
        let behavior = NfcReader::new(id, Arc::clone(&nfc_pub), Arc::clone(&self.tag_reader));
        self.add(inbox, behavior);

        let (dispatch, dispatch_pub) =
            self.sensor(DeviceId::DispatchSensor, IoRole::DispatchSensor, "dispatch")?;

        // Dice-half rack
        let (top, top_pub) =
            self.sensor(DeviceId::TopSensor, IoRole::RackTopSensor, "dice-half rack")?;
        let (bottom, bottom_pub) =
            self.sensor(DeviceId::BottomSensor, IoRole::RackBottomSensor, "dice-half rack")?;
        let (dicehalf_rack, inbox) = self.inbox(ActorId::DicehalfRack);
        let rack_pub = self.publisher(ActorId::DicehalfRack, DICEHALF_RACK_TOPICS);
        for p in [&top_pub, &bottom_pub] {
            p.subscribe_all(DEVICE_REPORTS, &dicehalf_rack)?;
        }
        self.watch_station(&dicehalf_rack, None)?;
        let behavior = DicehalfRack::new(
            dicehalf_rack.clone(),
            Arc::clone(&rack_pub),
            self.reporter.clone(),
            RackSensors { top, bottom },
            config.racks.dicehalf_maximum,
            timing.rack_full_check(),
        );
        self.add(inbox, behavior);

        // Services
        let mut table = ServiceTable::new();

        let init_targets = vec![
            carriage.clone(),
            press.clone(),
            dicehalf_rack.clone(),
            clamp.clone(),
            nfc.clone(),
            dispatch.clone(),
        ];
        let (me, inbox, core) = self.service(
            ServiceKind::Init,
            Some((timing.init_service(), ErrorCode::InitServiceTimeout)),
        )?;
        for p in [&carriage_pub, &press_pub, &rack_pub, &clamp_pub, &nfc_pub, &dispatch_pub] {
            p.subscribe(Topic::State, &me)?;
        }
        self.add(inbox, InitService::new(core, init_targets));
        table.bind(INITIALIZE_SLOT, ServiceKind::Init, me);

        let (me, inbox, core) = self.service(
            ServiceKind::Press,
            Some((timing.pressing_service(), ErrorCode::PressingServiceTimeout)),
        )?;
        carriage_pub.subscribe(Topic::State, &me)?;
        press_pub.subscribe(Topic::State, &me)?;
        nfc_pub.subscribe(Topic::Value, &me)?;
        let targets = PressJobTargets {
            carriage: carriage.clone(),
            press: press.clone(),
            clamp: clamp.clone(),
            nfc: nfc.clone(),
        };
        let behavior = PressService::new(core, targets, timing.clamp_wait(), timing.pressing_dwell());
        self.add(inbox, behavior);
        table.bind(1, ServiceKind::Press, me);

        let maximum = config.racks.dicehalf_maximum;
        for (slot, kind, op) in [
            (2, ServiceKind::ProvideDicehalf, DicehalfOp::Provide),
            (3, ServiceKind::RefillRack, DicehalfOp::Refill),
        ] {
            let (me, inbox, core) = self.service(
                kind,
                Some((timing.material_service(), ErrorCode::MaterialServiceTimeout)),
            )?;
            rack_pub.subscribe_all(
                &[Topic::State, Topic::NumberOfCurrentlyStoredDicehalves],
                &me,
            )?;
            self.add(inbox, DicehalfService::new(core, op, dicehalf_rack.clone(), maximum));
            table.bind(slot, kind, me);
        }

        let (me, inbox, core) = self.service(ServiceKind::Position, None)?;
        carriage_pub.subscribe(Topic::State, &me)?;
        self.add(inbox, PositionService::new(core, carriage.clone()));
        table.bind(4, ServiceKind::Position, me);

        let (me, inbox, core) = self.service(
            ServiceKind::Homing,
            Some((timing.homing_service(), ErrorCode::HomingServiceTimeout)),
        )?;
        for p in [&carriage_pub, &press_pub, &rack_pub] {
            p.subscribe(Topic::State, &me)?;
        }
        dispatch_pub.subscribe(Topic::Value, &me)?;
        let targets = HomingTargets {
            carriage: carriage.clone(),
            press,
            rack: dicehalf_rack,
            dispatch,
        };
        self.add(inbox, HomingService::new(core, targets));
        table.bind_homing(me);

        Ok(Plan {
            services: table,
            press_motor: Some(press_motor),
            carriage: Some(carriage),
            composites: vec![carriage_pub, press_pub, rack_pub],
            force: Some(ForceInput {
                pin: force_pin,
                target: force,
            }),
        })
    }

    // ─── Storage layout ─────────────────────────────────────────────

    fn storage(&mut self) -> Result<Plan, BuildError> {
        let config = self.config;
        let dir = &config.racks.storage_dir;
        std::fs::create_dir_all(dir).map_err(|source| BuildError::Storage {
            path: dir.clone(),
            source,
        })?;

        let mut racks = Vec::new();
        let mut rack_pubs = Vec::new();
        for n in 1..=config.racks.plate_racks {
            let (presence, presence_pub) = self.sensor(
                DeviceId::PresenceSensor(n),
                IoRole::PresenceSensor(n),
                "plate rack",
            )?;
            let (interaction, interaction_pub) = self.sensor(
                DeviceId::InteractionSensor(n),
                IoRole::InteractionSensor(n),
                "plate rack",
            )?;
            let id = ActorId::PlateRack(n);
            let (rack, inbox) = self.inbox(id);
            let publisher = self.publisher(id, PLATE_RACK_TOPICS);
            for p in [&presence_pub, &interaction_pub] {
                p.subscribe_all(DEVICE_REPORTS, &rack)?;
            }
            self.watch_station(&rack, None)?;
            let behavior = PlateRack::new(
                id,
                Arc::clone(&publisher),
                self.reporter.clone(),
                PlateRackSensors {
                    presence,
                    interaction,
                },
                StockStore::new(config.racks.stock_path(n)),
                config.racks.plate_maximum,
            );
            self.add(inbox, behavior);
            racks.push(rack);
            rack_pubs.push(publisher);
        }

        let timing = &config.timing;
        let mut table = ServiceTable::new();

        let (me, inbox, core) = self.service(
            ServiceKind::Init,
            Some((timing.init_service(), ErrorCode::InitServiceTimeout)),
        )?;
        for p in &rack_pubs {
            p.subscribe(Topic::State, &me)?;
        }
        self.add(inbox, InitService::new(core, racks.clone()));
        table.bind(INITIALIZE_SLOT, ServiceKind::Init, me);

        for (slot, kind, op) in [
            (1, ServiceKind::ProvideMaterial, MaterialOp::Provide),
            (2, ServiceKind::RefillMaterial, MaterialOp::Refill),
            (3, ServiceKind::ResetMaterial, MaterialOp::Reset),
        ] {
            let (me, inbox, core) = self.service(
                kind,
                Some((timing.material_service(), ErrorCode::MaterialServiceTimeout)),
            )?;
            for p in &rack_pubs {
                p.subscribe(Topic::State, &me)?;
            }
            self.add(inbox, MaterialService::new(core, op, racks.clone()));
            table.bind(slot, kind, me);
        }

        Ok(Plan {
            services: table,
            press_motor: None,
            carriage: None,
            composites: rack_pubs,
            force: None,
        })
    }

    // ─── Station ────────────────────────────────────────────────────

    /// Composites follow the station state and its `Ack`; moving ones also
    /// stop on the safety switch.
    fn watch_station(
        &self,
        target: &ActorRef,
        safety: Option<&Arc<Publisher>>,
    ) -> Result<(), BuildError> {
        self.surface.subscribe_all(STATION_SIGNALS, target)?;
        if let Some(safety) = safety {
            safety.subscribe(Topic::Value, target)?;
        }
        Ok(())
    }

    fn station(&mut self, shared: SharedDevices, plan: Plan) -> Result<(), BuildError> {
        shared
            .safety_publisher
            .subscribe_all(&[Topic::State, Topic::Value], &self.station)?;
        for p in &plan.composites {
            p.subscribe(Topic::State, &self.station)?;
        }
        let devices = StationDevices {
            led: shared.led,
            blinker: shared.blinker,
            safety: shared.safety,
            press_motor: plan.press_motor,
            carriage: plan.carriage,
        };
        let settings = StationSettings {
            homing_required: self.config.station.homing_required,
            blink: self.blink_pattern(),
        };
        let station = Station::new(
            Arc::clone(&self.surface),
            self.reporter.clone(),
            devices,
            plan.services,
            settings,
        );
        if let Some(inbox) = self.station_inbox.take() {
            self.add(inbox, station);
        }
        Ok(())
    }

    /// Spawn every actor in creation order, then the control loop.
    fn finish(self, force: Option<ForceInput>) -> Cell {
        let actors: Vec<ActiveObject> = self
            .pending
            .into_iter()
            .map(|(inbox, behavior)| ActiveObject::spawn(inbox, behavior))
            .collect();
        debug!(actors = actors.len(), "Station actors spawned");

        let control_loop = force.map(|input| {
            ControlLoop::spawn(
                Arc::clone(&self.image),
                input.pin,
                self.config.force.setpoint,
                self.config.timing.control_tick(),
                input.target,
            )
        });

        info!(
            layout = ?self.config.station.layout,
            service = %self.config.shared.service_name,
            "Station started"
        );
        Cell {
            layout: self.config.station.layout,
            station: self.station,
            surface: self.surface,
            refs: self.refs,
            publishers: self.publishers,
            actors,
            control_loop,
        }
    }
}

/// Edge callback posting the edge into `target`'s inbox.
fn edge_forwarder(target: &ActorRef) -> EdgeCallback {
    let target = target.clone();
    Arc::new(move |edge: Edge| {
        if let Err(e) = target.post(Event::new(EventKind::Edge(edge), ActorId::ProcessImage)) {
            error!("Edge lost: {}", e);
        }
    })
}
