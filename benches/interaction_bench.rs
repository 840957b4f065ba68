use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember_veil::actors::character;
use ember_veil::core::config::EngineConfig;
use ember_veil::interactions::impact::process_impact;
use ember_veil::parts::{BodyPart, ContainerSlot, ItemContainer};
use ember_veil::simulation::run_tick;
use ember_veil::world::World;

fn populated_world(characters: usize) -> World {
    let mut config = EngineConfig::default();
    config.turn_based = true;
    let mut world = World::new(config);
    for index in 0..characters {
        let root = world
            .templates
            .spawn(&mut world.arena, "Humanoid")
            .expect("factory body");
        let who = world.spawn_character(&format!("Citizen {index}"), root);
        character::birth(&mut world, who, root).expect("birth");
    }
    world
}

fn bench_ticks(c: &mut Criterion) {
    let mut world = populated_world(32);

    let mut group = c.benchmark_group("Simulation");
    group.bench_function("run_tick over 32 embodied characters", |b| {
        b.iter(|| {
            black_box(run_tick(&mut world, 0.0));
        });
    });
    group.finish();
}

fn bench_impacts(c: &mut Criterion) {
    let mut world = World::new(EngineConfig::default());
    let mut chest = BodyPart::new("Chest");
    chest.weight = 8.0;
    chest.health = 1e12;
    chest.health_max = Some(1e12);
    let chest = world.arena.alloc(chest);
    let mut round = BodyPart::new("Bullet");
    round.weight = 0.008;
    let round = world.arena.alloc(round);

    let mut group = c.benchmark_group("Impact");
    group.bench_function("process_impact through one layer", |b| {
        b.iter(|| {
            black_box(process_impact(&mut world, 480.0, 0.9, round, chest, true).unwrap());
        });
    });
    group.finish();
}

fn bench_containers(c: &mut Criterion) {
    let mut world = World::new(EngineConfig::default());
    let mut pack = BodyPart::new("Field Pack");
    pack.contains = Some(ItemContainer::new(Some(0.1), Some(20.0)));
    let pack = world.arena.alloc(pack);
    let mut tin = BodyPart::new("Ration Tin");
    tin.weight = 0.4;
    tin.volume = 0.002;
    let tin = world.arena.alloc(tin);

    let mut group = c.benchmark_group("Containers");
    group.bench_function("pack and unpack one measured item", |b| {
        b.iter(|| {
            world
                .arena
                .container_add(pack, ContainerSlot::Contains, tin)
                .unwrap();
            black_box(world.arena.container_remove(
                pack,
                ContainerSlot::Contains,
                Some("Ration Tin"),
                1,
            ));
        });
    });
    group.finish();
}

criterion_group!(benches, bench_ticks, bench_impacts, bench_containers);
criterion_main!(benches);
