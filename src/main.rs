mod clipboard;
mod crypto;
mod error;
mod format;
mod keyring;
mod lifecycle;
mod lock;
mod metadata;
mod prompt;
mod seal;
mod secret;
mod store;
mod vcs;

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;

use error::{Result, VaultError};

#[derive(Parser)]
#[command(name = "vault", version, about = "Simple encrypted data store")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new vault
    Init,

    /// List secrets under a path (defaults to the root)
    List {
        #[arg(default_value = "")]
        path: String,
    },

    /// Show a secret's attributes, or copy/write one
    Show {
        path: String,
        /// Print the redacted attribute(s) in clear text
        #[arg(short, long)]
        print: bool,
        /// Copy an attribute to the clipboard instead of printing
        #[arg(short = 'c', long = "clip")]
        clip: bool,
        /// Which attribute to act on for --clip / --stdout (default: the
        /// lone eyes-only attribute, or "password")
        #[arg(short = 'a', long = "clip-attributes")]
        attr: Option<String>,
        /// Write file attributes out to disk
        #[arg(short, long)]
        write: bool,
        /// Restrict -w/-s to these attribute names
        #[arg(short = 'f', long = "file")]
        files: Vec<String>,
        /// Print a file attribute's decoded bytes to stdout
        #[arg(short = 's', long = "stdout")]
        stdout: bool,
    },

    /// Add a secret
    Add {
        path: String,
        /// Attributes as name=value
        attributes: Vec<String>,
        #[arg(short = 'l', long = "length", default_value_t = 16)]
        length: usize,
        #[arg(long)]
        symbols: bool,
    },

    /// Edit an existing secret
    Edit {
        path: String,
        /// Attributes as name=value
        attributes: Vec<String>,
        #[arg(short = 'd', long = "delete")]
        delete: Vec<String>,
        #[arg(short = 'l', long = "length", default_value_t = 16)]
        length: usize,
        #[arg(long)]
        symbols: bool,
    },

    /// Rename a secret
    Rename { path: String, newpath: String },

    /// Delete a secret
    Delete { path: String },

    /// Vault key (passphrase slot) management
    #[command(subcommand)]
    Key(KeyCommand),

    /// Unseal the store until the seal is removed
    Unseal,

    /// Seal the store
    Seal,

    /// Archive the store in a git repository
    #[command(subcommand)]
    Git(GitCommand),
}

#[derive(Subcommand)]
enum KeyCommand {
    /// List all keys available in the vault
    List,
    /// Add a key that unlocks the vault
    Add {
        #[arg(short, long)]
        comment: String,
    },
    /// Delete a key from the vault
    Delete { id: usize },
    /// Rotate the vault master key
    Rotate,
}

#[derive(Subcommand)]
enum GitCommand {
    /// Clone an existing store repository
    Clone { url: String },
    /// Set the remote git repository to push to
    Remote { url: String },
    /// Push the state of the store
    Push,
    /// Pull the state of the store
    Pull,
}

fn parse_attribute_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| VaultError::UserInput(format!("'{pair}' is not in name=value form")))
        })
        .collect()
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = store::resolve_vault_root()?;

    // `git clone` and `init` are the only two commands allowed to run
    // before a vault exists.
    match &cli.cmd {
        Command::Init => {
            store::create_vault_dir(&root)?;
            let _lock = lock::VaultLock::acquire(&root)?;
            return lifecycle::init(&root);
        }
        Command::Git(GitCommand::Clone { url }) => return vcs::clone(&root, url),
        _ => {}
    }

    store::assert_vault_exists(&root)?;
    store::detect_inconsistent_rotation(&root)?;

    match cli.cmd {
        Command::Init | Command::Git(GitCommand::Clone { .. }) => unreachable!(),

        Command::List { path } => {
            format::print_tree(&root, &path);
            Ok(())
        }

        Command::Show { path, print, clip, attr, write, files, stdout } => {
            let ctx = keyring::unlock(&root)?;
            let attrs = secret::read_secret(&root, &path, &ctx.master_key.0)?;

            if write {
                let written = secret::write_file_attributes(&path, &attrs, &files)?;
                for file in written {
                    info!("attribute written to '{}'", file.display());
                }
                return Ok(());
            }

            if stdout {
                let selected: Vec<_> = attrs
                    .iter()
                    .filter(|(name, a)| a.file && (files.is_empty() || files.contains(name)))
                    .collect();
                let (_, attribute) = selected
                    .first()
                    .ok_or_else(|| VaultError::UserInput("no file attribute matching what you requested".into()))?;
                use base64::engine::general_purpose::STANDARD as BASE64;
                use base64::Engine;
                let bytes = BASE64
                    .decode(&attribute.value)
                    .map_err(|e| VaultError::CorruptSecret { path: format!("{path} ({e})") })?;
                std::io::stdout().write_all(&bytes)?;
                return Ok(());
            }

            if clip {
                let clip_attr = attr.unwrap_or_else(|| default_clip_attribute(&attrs));
                let value = attrs
                    .get(&clip_attr)
                    .ok_or_else(|| VaultError::UserInput(format!("could not read attribute '{clip_attr}'")))?;
                clipboard::copy_to_clipboard(&value.value)?;
                info!("attribute '{clip_attr}' of '{path}' was copied to your clipboard");
                return Ok(());
            }

            format::print_attributes(&path, &attrs, print);
            Ok(())
        }

        Command::Add { path, attributes, length, symbols } => {
            let _lock = lock::VaultLock::acquire(&root)?;
            let ctx = keyring::unlock(&root)?;
            let pairs = parse_attribute_pairs(&attributes)?;
            secret::add_secret(&root, &path, &pairs, &ctx.master_key.0, length, symbols)?;
            info!("secret '{path}' added successfully");
            Ok(())
        }

        Command::Edit { path, attributes, delete, length, symbols } => {
            let _lock = lock::VaultLock::acquire(&root)?;
            let ctx = keyring::unlock(&root)?;
            let pairs = parse_attribute_pairs(&attributes)?;
            secret::edit_secret(&root, &path, &pairs, &delete, &ctx.master_key.0, length, symbols)?;
            info!("secret '{path}' edited successfully");
            Ok(())
        }

        Command::Rename { path, newpath } => {
            let _lock = lock::VaultLock::acquire(&root)?;
            secret::rename_secret(&root, &path, &newpath)?;
            info!("secret '{path}' renamed to '{newpath}'");
            Ok(())
        }

        Command::Delete { path } => {
            let _lock = lock::VaultLock::acquire(&root)?;
            secret::delete_secret(&root, &path)?;
            info!("secret '{path}' deleted successfully");
            Ok(())
        }

        Command::Key(key_cmd) => match key_cmd {
            KeyCommand::List => {
                let meta = lifecycle::list_keys(&root)?;
                for (id, slot) in meta.master_keys.iter().enumerate() {
                    println!("[{id}] {} (created {})", slot.comment, slot.created_on);
                }
                Ok(())
            }
            KeyCommand::Add { comment } => {
                let _lock = lock::VaultLock::acquire(&root)?;
                lifecycle::add_key(&root, &comment)
            }
            KeyCommand::Delete { id } => {
                let _lock = lock::VaultLock::acquire(&root)?;
                lifecycle::delete_key(&root, id)
            }
            KeyCommand::Rotate => {
                let _lock = lock::VaultLock::acquire(&root)?;
                lifecycle::rotate_master(&root)
            }
        },

        Command::Unseal => {
            let meta = keyring::load_meta(&root)?;
            let seal_path = seal::seal_path(&meta.uuid);
            if seal::is_unsealed(&seal_path) {
                return Err(VaultError::UserInput("store is already unsealed".into()));
            }
            let ctx = keyring::unlock(&root)?;
            seal::write_seal(&seal_path, &ctx.unlocker.0)?;
            info!("store is now unsealed");
            Ok(())
        }

        Command::Seal => {
            let meta = keyring::load_meta(&root)?;
            let seal_path = seal::seal_path(&meta.uuid);
            seal::remove_seal(&seal_path)?;
            info!("store is now sealed");
            Ok(())
        }

        Command::Git(git_cmd) => match git_cmd {
            GitCommand::Clone { .. } => unreachable!(),
            GitCommand::Remote { url } => vcs::set_remote(&root, &url),
            GitCommand::Push => vcs::push(&root),
            GitCommand::Pull => vcs::pull(&root),
        },
    }
}

/// When no explicit attribute is named for `--clip`, the prior art prefers
/// the single eyes-only attribute if there is exactly one, falling back
/// to "password".
fn default_clip_attribute(attrs: &metadata::AttributeMap) -> String {
    let eyes_only: Vec<&String> = attrs.iter().filter(|(_, a)| a.eyes_only).map(|(name, _)| name).collect();
    if eyes_only.len() == 1 {
        eyes_only[0].clone()
    } else {
        "password".to_string()
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vault: {e}");
            ExitCode::FAILURE
        }
    }
}
