use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use openpgp_card_driver::driver::{OpenPgpCardBuilder, SelectPath};
use openpgp_card_driver::iso::{BerTlvParser, MockTransport, Pkcs1PubkeyEncoder, ATR_V2};

#[derive(Parser)]
struct Args {
    /// DO tag to GET DATA, in hex (e.g. 0101)
    #[clap(short, long)]
    tag: Option<String>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the children of a directory path (hex tags, comma-separated)
    List {
        #[clap(default_value = "")]
        path: String,
    },
}

fn parse_path(path: &str) -> Result<Vec<u16>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split(',')
        .map(|tag| u16::from_str_radix(tag.trim(), 16).map_err(Into::into))
        .collect()
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let transport = MockTransport::new(ATR_V2.to_vec())
        .with_do(0x0101, vec![0x01, 0x02, 0x03])
        .with_do(0x006E, vec![0x5F, 0x52, 0x02, 0xAA, 0xBB]);
    let mut card = OpenPgpCardBuilder::new(transport, BerTlvParser, Pkcs1PubkeyEncoder).build();
    card.init()?;
    info!("applet selected");

    match args.command {
        Some(Command::List { path }) => {
            let tags = parse_path(&path)?;
            let outcome = card.select_file(&SelectPath(tags))?;
            for tag in card.list_files(outcome.blob)? {
                println!("{tag:04X}");
            }
        }
        None => {
            if let Some(tag) = args.tag {
                let tag = u16::from_str_radix(&tag, 16)?;
                let value = card.get_data(tag)?;
                println!("{}", hex_encode(&value));
            } else {
                println!("no command given; pass --tag <hex> or `list [path]`");
            }
        }
    }

    card.finish()?;
    Ok(())
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
