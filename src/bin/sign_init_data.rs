//! Print a signed launch payload, for poking at the API locally:
//!
//! ```text
//! curl -X POST -H "Authorization: tma $(sign-init-data -t $BOT_TOKEN -i 1 -u alice)" \
//!     http://127.0.0.1:8080/api/open
//! ```

use chrono::Utc;
use clap::Parser;

use luckybox::auth::InitDataValidator;
use luckybox::models::telegram::WebAppUser;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short = 't', long)]
    bot_token: String,
    #[arg(short = 'i', long)]
    user_id: i64,
    #[arg(short = 'u', long)]
    username: Option<String>,
    #[arg(short = 'f', long, default_value = "Tester")]
    first_name: String,
}

fn main() {
    let args = Args::parse();

    let user = WebAppUser {
        id: args.user_id,
        first_name: args.first_name,
        last_name: None,
        username: args.username,
        language_code: None,
    };

    let validator = InitDataValidator::new(&args.bot_token);
    println!("{}", validator.sign_user(&user, Utc::now()));
}
