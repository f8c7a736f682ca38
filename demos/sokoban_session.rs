//! Plays a generated puzzle with its own solution, then opens a countdown
//! session through the registry.
//!
//! Run with `RUST_LOG=tower_gym=debug cargo run --example sokoban_session`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tower_gym::env::sokoban::generate::{generate_room, GenerationParams};
use tower_gym::env::sokoban::room::RoomSetup;
use tower_gym::{function_call, Action, RegistryConfig, SchemaFormat, SessionRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let registry = SessionRegistry::with_builtin_envs(RegistryConfig::default());

    // Generate a room here so its solution is known, then load it by setup.
    let params = GenerationParams {
        dims: (7, 7),
        num_boxes: 2,
        num_steps: GenerationParams::default_steps((7, 7)),
        max_attempts: 64,
    };
    let mut rng = StdRng::seed_from_u64(7);
    let generated = generate_room(&params, &mut rng)?;
    let setup: RoomSetup = generated.room.to_setup();

    let created = registry
        .create(
            "sokoban",
            None,
            Some(json!({"dim_room": [7, 7], "num_boxes": 2, "room_setup": setup})),
        )
        .await?;
    let id = created.session_id;
    println!("{}\n", created.observation[0].content);

    let mut total = 0.0;
    for (turn, command) in generated.solution.iter().enumerate() {
        let action = Action::with_tool_calls(vec![function_call(
            format!("call_{turn}"),
            command.tool_name(),
            "{}",
        )]);
        let step = registry.step(&id, &action).await?;
        total += step.reward;
        if step.done {
            println!("{}\n", step.observation[0].content);
            println!("solved in {} turns, return {total:.1}", turn + 1);
            break;
        }
    }

    // A fresh generated room on the same session.
    registry.reset(&id, Some(1), None).await?;
    registry.close(&id).await;

    let countdown = registry.create("countdown", Some(3), None).await?;
    println!("{}", registry.prompt(&countdown.session_id).await?);
    let tools = registry
        .schema(&countdown.session_id, SchemaFormat::Anthropic)
        .await?;
    println!("{}", serde_json::to_string_pretty(&tools)?);
    registry.close(&countdown.session_id).await;
    Ok(())
}
