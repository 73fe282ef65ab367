use std::env;

fn main() {
    // Load .env file during build for environment variables
    if let Err(e) = dotenvy::dotenv() {
        println!(
            "cargo:warning=BUILD.RS: Failed to load .env file: {}. Using system environment variables.",
            e
        );
    }

    // Embed the backend base URL at compile time so packaged builds keep working
    // without a .env file next to the executable.
    if let Ok(base_url) = env::var("BURNOUT_BACKEND_URL") {
        println!("cargo:rustc-env=BURNOUT_BACKEND_URL={}", base_url);
        println!("cargo:warning=Embedded BURNOUT_BACKEND_URL={}", base_url);
    }

    tauri_build::build()
}
