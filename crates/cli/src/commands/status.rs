//! `parlance status` — show configuration and store health.

use parlance_config::AppConfig;
use parlance_store::SqliteStore;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;

    println!("config file : {}", config_path.display());
    println!("store       : {}", config.store.path);
    println!("bot         : {} ({})", config.bot.nickname, config.bot.id);
    println!("model url   : {}", config.models.api_url);

    let mut roles: Vec<_> = config.models.roles.iter().collect();
    roles.sort();
    if roles.is_empty() {
        println!("model roles : (none configured)");
    } else {
        println!("model roles :");
        for (role, model) in roles {
            println!("  {role} -> {model}");
        }
    }

    // Opening the store runs the migrations, so this doubles as a health
    // check of the database file.
    match SqliteStore::new(&config.store.path).await {
        Ok(_) => println!("store check : ok"),
        Err(e) => println!("store check : FAILED ({e})"),
    }

    Ok(())
}
