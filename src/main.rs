//! Ember Veil - demo shell
//!
//! A line-oriented front end over the engine's public surface: builds a
//! world from the built-in templates, births a player and a sparring
//! partner onto the two mediums, and forwards keyboard-style commands
//! into the binding layer while a loop thread steps the clock. The loop
//! thread is the world's only writer; stdin stays on the shell side of
//! an mpsc channel.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ember_veil::actors::character;
use ember_veil::core::config::EngineConfig;
use ember_veil::core::error::Result;
use ember_veil::core::types::ActorId;
use ember_veil::hooks::names;
use ember_veil::parts::ContainerSlot;
use ember_veil::simulation::tick::run_tick;
use ember_veil::stats::IndicatorKind;
use ember_veil::world::World;

/// Real-time RPG interaction engine, demo shell.
#[derive(Parser)]
#[command(name = "ember-veil", version, about)]
struct Args {
    /// Step the clock by whole turns on `step` instead of wall time.
    #[arg(long)]
    turn_based: bool,

    /// Seed for the world's dice.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Engine configuration TOML; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

enum Command {
    Press(String),
    Release(String),
    Tap(String),
    Status,
    Step,
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ember_veil=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.turn_based {
        config.turn_based = true;
    }
    let frame = Duration::from_millis(1000 / u64::from(config.fps_max.max(1)));
    let turn_based = config.turn_based;

    let mut world = World::with_seed(config, args.seed);
    register_console_hooks(&mut world);
    let player = stage(&mut world)?;
    tracing::info!(seed = args.seed, turn_based, "world staged");

    banner(turn_based);

    let (sender, commands) = mpsc::channel();
    let engine = thread::spawn(move || {
        let started = Instant::now();
        loop {
            let stamp = started.elapsed().as_secs_f64() * 1000.0;
            match commands.recv_timeout(frame) {
                Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => {
                    if let Err(err) = apply(&mut world, player, command, stamp) {
                        tracing::warn!(error = %err, "command refused");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            if !turn_based {
                run_tick(&mut world, started.elapsed().as_secs_f64() * 1000.0);
            }
        }
        println!(
            "final state: {} actors at {:.0} ms",
            world.roster.len(),
            world.now()
        );
    });

    read_commands(sender);
    let _ = engine.join();
    Ok(())
}

/// Forward stdin lines until quit or EOF. The channel closing is what
/// stops the engine thread when input runs dry.
fn read_commands(sender: Sender<Command>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        let Some(command) = parse_line(trimmed) else {
            if !trimmed.is_empty() {
                println!(
                    "commands: press <key> | release <key> | tap <key> | status | step | quit"
                );
            }
            continue;
        };
        let quitting = matches!(command, Command::Quit);
        if sender.send(command).is_err() || quitting {
            break;
        }
    }
    let _ = sender.send(Command::Quit);
}

fn parse_line(line: &str) -> Option<Command> {
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match (word, rest) {
        ("quit" | "q", _) => Some(Command::Quit),
        ("status" | "s", _) => Some(Command::Status),
        ("step" | "t", _) => Some(Command::Step),
        ("press" | "p", key) if !key.is_empty() => Some(Command::Press(key.to_string())),
        ("release" | "r", key) if !key.is_empty() => Some(Command::Release(key.to_string())),
        ("tap", key) if !key.is_empty() => Some(Command::Tap(key.to_string())),
        _ => None,
    }
}

fn apply(world: &mut World, player: ActorId, command: Command, stamp: f64) -> Result<()> {
    match command {
        Command::Press(key) => character::binding_down(world, player, &key),
        Command::Release(key) => character::binding_up(world, player, &key),
        Command::Tap(key) => {
            character::binding_down(world, player, &key)?;
            character::binding_up(world, player, &key)
        }
        Command::Status => {
            print_status(world);
            Ok(())
        }
        Command::Step => {
            let turned = run_tick(world, stamp);
            println!("stepped {} actors to {:.0} ms", turned, world.now());
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

/// Build the demo cast: both mediums, a player, and a sparring partner,
/// all connected, with a loaded sidearm in the player's hand.
fn stage(world: &mut World) -> Result<ActorId> {
    let root = world
        .templates
        .instantiate(&mut world.arena, "Physical Medium")?;
    let ground = world.spawn_medium("Physical Medium", root);
    let root = world.templates.instantiate(&mut world.arena, "Universe")?;
    let cosmos = world.spawn_medium("Universe", root);

    let body = world.templates.instantiate(&mut world.arena, "Humanoid")?;
    let player = world.spawn_character("Vesper", body);
    character::birth(world, player, body)?;
    let body = world.templates.instantiate(&mut world.arena, "Humanoid")?;
    let partner = world.spawn_character("Mirren", body);
    character::birth(world, partner, body)?;

    for who in [player, partner] {
        for via in [ground, cosmos] {
            if let Some(state) = world.actor_mut(via)?.as_medium_mut() {
                state.connect(who);
            }
        }
    }

    let sidearm = world.templates.instantiate(&mut world.arena, "Sidearm")?;
    let hand = world
        .actor(player)?
        .as_character()
        .and_then(|state| state.manipulators.first().copied());
    if let Some(hand) = hand {
        if let Err(err) = world
            .arena
            .container_add(hand, ContainerSlot::Contains, sidearm)
        {
            tracing::warn!(error = %err, "sidearm would not fit the hand");
        }
    }
    Ok(player)
}

/// The presentation-side hooks a real front end would claim, stubbed to
/// the console.
fn register_console_hooks(world: &mut World) {
    world.hooks.observe(names::CHARACTER_FEEDBACK, |payload| {
        println!("* feedback {}", payload.detail);
    });
    world.hooks.observe(names::UNKNOWN_INTERACTION, |payload| {
        println!("* nothing resolves {}", payload.detail);
    });
    world.hooks.observe(names::CHARACTER_VECTOR, |payload| {
        println!("* vector {}", payload.detail);
    });
    world.hooks.observe(names::INVENTORY_TOGGLE, |_| {
        println!("* inventory toggled");
    });
    world.hooks.observe(names::CHARACTER_SHEET_TOGGLE, |_| {
        println!("* character sheet toggled");
    });
    world.hooks.observe(names::CHARACTER_SAVE, |_| {
        println!("* save requested; persistence stays outside the engine");
    });
    world.hooks.observe(names::ERROR, |payload| {
        eprintln!("! {}", payload.detail);
    });
}

fn print_status(world: &World) {
    println!();
    println!(
        "--- {:.0} ms | {} actors ---",
        world.now(),
        world.roster.len()
    );
    for id in &world.roster {
        let Ok(actor) = world.actor(*id) else { continue };
        match actor.as_character() {
            Some(state) => println!(
                "  {:<10} {:<9} queue {:<2} energy {:>6.1} fatigue {:>6.1} {}",
                actor.name,
                actor.role_name(),
                actor.interactions.len(),
                state.indicator_pool(IndicatorKind::Energy),
                state.indicator_pool(IndicatorKind::Fatigue),
                if state.is_conscious() { "awake" } else { "out" },
            ),
            None => println!(
                "  {:<10} {:<9} queue {}",
                actor.name,
                actor.role_name(),
                actor.interactions.len(),
            ),
        }
    }
    println!();
}

fn banner(turn_based: bool) {
    println!();
    println!("=== EMBER VEIL ===");
    println!("interaction engine demo; keys go to the player's bindings");
    println!();
    println!("  press <key>    hold a key down (w/a/s/d move, shift sprints, ctrl crouches)");
    println!("  release <key>  let it back up");
    println!("  tap <key>      press and release together (j/k melee, i inventory, c sheet)");
    println!("  press m <group> <name> <points>   allocation console, e.g. press m stats Strength 2");
    println!("  status         roster and indicator pools");
    if turn_based {
        println!("  step           advance one whole turn");
    }
    println!("  quit           leave");
    println!();
}
