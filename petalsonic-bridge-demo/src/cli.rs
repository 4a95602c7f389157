use anyhow::{Result, bail};
use petalsonic_bridge::backend::NullBackend;
use petalsonic_bridge::{
    AudioWorld, BridgeDesc, BridgeEvent, EnvironmentInfo, FileInfo, ObjectFunctionality,
    PanningRule, ParameterInfo, SwitchStateInfo, Transformation, TriggerInfo, TriggerResult,
    Vec3,
};
use std::sync::Arc;

const FRAME_TIME: f32 = 1.0 / 60.0;

pub fn run_scenarios() -> Result<()> {
    log::info!("=== Running Virtualization Scenario ===");
    virtualization_scenario()?;

    log::info!("=== Running Trigger Lifetime Scenario ===");
    trigger_lifetime_scenario()?;

    log::info!("=== Running Bank Scenario Without Internal Thread ===");
    bank_scenario()?;

    log::info!("All scenarios completed");
    Ok(())
}

fn at(x: f32, z: f32) -> Transformation {
    Transformation::from_position(Vec3::new(x, 0.0, z))
}

fn drain(world: &AudioWorld) -> usize {
    let events = world.poll_events();
    for event in &events {
        match event {
            BridgeEvent::TriggerInstanceFinished {
                object,
                trigger_instance_id,
            } => log::info!(
                "Trigger instance {} finished on {}",
                trigger_instance_id,
                object
            ),
            BridgeEvent::ObjectVirtualized { object } => log::info!("{} went virtual", object),
            BridgeEvent::ObjectPhysicalized { object } => {
                log::info!("{} is audible again", object)
            }
        }
    }
    events.len()
}

fn virtualization_scenario() -> Result<()> {
    let backend = Arc::new(NullBackend::new());
    let mut world = AudioWorld::new(BridgeDesc::default(), backend.clone())?;
    world.set_max_attenuations([("Play_Waterfall", 30.0)]);

    let player = world.construct_listener(at(10.0, 0.0), "player")?;
    let spectator = world.construct_listener(at(50.0, 0.0), "spectator")?;
    let waterfall = world.construct_object(at(0.0, 0.0), "waterfall")?;
    let loop_trigger = world.construct_trigger(&TriggerInfo::named("Play_Waterfall"))?;

    let cave = world.construct_environment(&EnvironmentInfo::aux_bus("Cave"))?;
    world.set_environment(waterfall, cave, 0.6);
    world.toggle_functionality(waterfall, ObjectFunctionality::TrackRelativeVelocity, true);

    match world.execute_trigger(waterfall, loop_trigger, 1) {
        TriggerResult::Playing => log::info!("Waterfall is playing"),
        TriggerResult::Virtual => log::info!("Waterfall started virtual"),
        TriggerResult::Failure => bail!("Waterfall trigger failed"),
    }

    // Walk the player away until the waterfall falls out of range.
    for step in 1..=40 {
        world.set_listener_transformation(player, at(10.0 + step as f32, 0.0));
        world.update(FRAME_TIME);
        drain(&world);
    }

    let object = world
        .object(waterfall)
        .ok_or_else(|| anyhow::anyhow!("waterfall vanished"))?;
    log::info!(
        "Closest listener at {:.1} units, virtual: {}",
        object.shortest_distance_to_listener(),
        object.is_virtual()
    );

    world.set_listener_transformation(spectator, at(5.0, 0.0));
    world.update(FRAME_TIME);
    drain(&world);

    world.destruct_listener(spectator);
    world.destruct_object(waterfall);
    drain(&world);

    world.shutdown()?;
    Ok(())
}

fn trigger_lifetime_scenario() -> Result<()> {
    let backend = Arc::new(NullBackend::new());
    let mut world = AudioWorld::new(BridgeDesc::default(), backend.clone())?;

    world.construct_listener(Transformation::identity(), "camera")?;
    let door = world.construct_object(at(0.0, -3.0), "door")?;
    let creak = world.construct_trigger(&TriggerInfo::named("Play_Door_Creak"))?;

    let wind = world.construct_parameter(&ParameterInfo::new("wind_speed").with_scaling(0.1, 0.0))?;
    world.set_global_parameter(wind, 42.0);
    let weather = world.construct_switch_state(&SwitchStateInfo::state("weather", "storm"))?;
    world.set_global_switch_state(weather);
    let material = world.construct_switch_state(&SwitchStateInfo::switch("material", "wood"))?;
    world.set_switch_state(door, material);

    world.execute_trigger(door, creak, 100);
    world.execute_trigger(door, creak, 101);
    world.destruct_trigger(creak);

    if let Some(trigger) = world.trigger(creak) {
        log::info!(
            "Trigger \"{}\" kept alive by {} instances",
            trigger.name(),
            trigger.instance_count()
        );
    }

    backend.finish_all();
    world.update(FRAME_TIME);
    let reported = drain(&world);
    log::info!(
        "{} reports, trigger freed: {}",
        reported,
        world.trigger(creak).is_none()
    );

    let stats = world.pool_stats();
    log::info!(
        "Pools: {}/{} objects, {}/{} event instances",
        stats.objects.constructed,
        stats.objects.capacity,
        stats.event_instances.constructed,
        stats.event_instances.capacity
    );

    world.shutdown()?;
    Ok(())
}

fn bank_scenario() -> Result<()> {
    let backend = Arc::new(NullBackend::new());
    let desc = BridgeDesc::default().with_internal_thread(false);
    let mut world = AudioWorld::new(desc, backend.clone())?;

    let level = world.construct_file(&FileInfo::new("Level01.bnk"))?;
    let data = vec![0u8; 1024];

    if !world.register_in_memory_file(level, &data).is_success() {
        bail!("Failed to register level bank");
    }
    log::info!("Loaded banks: {:?}", backend.loaded_banks());

    // Blocks until the aux thread has rendered on our behalf.
    if !world.unregister_in_memory_file(level).is_success() {
        bail!("Failed to unregister level bank");
    }
    log::info!(
        "Level bank unloaded after {} render steps",
        backend.render_count()
    );

    let dialogue = world.construct_file(&FileInfo::localized("Dialogue.bnk"))?;
    world.set_language("german");
    world.set_panning_rule(PanningRule::Headphones);
    if !world.load_file(dialogue).is_success() {
        bail!("Failed to load dialogue bank");
    }
    log::info!(
        "Dialogue loaded from {}",
        world.file_location(dialogue).unwrap_or_default()
    );

    world.on_refresh();
    world.destruct_file(dialogue);
    world.destruct_file(level);
    world.shutdown()?;
    Ok(())
}
