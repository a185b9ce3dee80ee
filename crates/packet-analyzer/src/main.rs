use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayonics_protocol::codec::{self, FRAME_LEN, SYSTEM_KEY};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "packet-analyzer")]
#[command(about = "Analyze Rayonics BLE smart-key frame captures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a Wireshark/btsnoop hex dump file
    File {
        /// Path to hex dump file
        path: PathBuf,
        /// Decryption key as 32 hex chars; defaults to the static system key
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Parse a hex string directly
    Hex {
        /// Hex string for one 19-byte frame (e.g. "0123...")
        #[arg(short, long)]
        data: String,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Interactive mode - paste hex and analyze
    Interactive,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::File { path, key } => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read file: {:?}", path))?;
            analyze_hex_dump(&content, resolve_key(key.as_deref())?)?;
        }
        Commands::Hex { data, key } => {
            let bytes = parse_hex_string(&data)?;
            analyze_frame(&bytes, resolve_key(key.as_deref())?)?;
        }
        Commands::Interactive => {
            interactive_mode()?;
        }
    }

    Ok(())
}

fn resolve_key(key: Option<&str>) -> Result<[u8; 16]> {
    match key {
        None => Ok(SYSTEM_KEY),
        Some(hex_key) => {
            let bytes = parse_hex_string(hex_key)?;
            bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("key must be exactly 16 bytes (32 hex chars)"))
        }
    }
}

fn analyze_hex_dump(content: &str, key: [u8; 16]) -> Result<()> {
    println!("=== Analyzing Hex Dump ===\n");

    let mut all_bytes = Vec::new();
    for line in content.lines() {
        if let Some(hex_part) = extract_hex_from_line(line) {
            let bytes = parse_hex_string(&hex_part)?;
            all_bytes.extend(bytes);
        }
    }

    if all_bytes.is_empty() {
        println!("No hex data found in file. Make sure it's a hex dump.");
        return Ok(());
    }

    println!("Total bytes extracted: {}\n", all_bytes.len());

    for (i, chunk) in all_bytes.chunks(FRAME_LEN).enumerate() {
        println!("--- Frame {} ---", i);
        if chunk.len() < FRAME_LEN {
            println!("(trailing {} bytes, not a full frame)", chunk.len());
            print_hex_dump(chunk);
            continue;
        }
        analyze_frame(chunk, key)?;
    }

    Ok(())
}

fn extract_hex_from_line(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }
    if !parts[0].chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let mut hex_string = String::new();
    for part in &parts[1..] {
        if part.len() > 2 && !part.chars().all(|c| c.is_ascii_hexdigit()) {
            break;
        }
        hex_string.push_str(part);
    }

    if hex_string.is_empty() {
        None
    } else {
        Some(hex_string)
    }
}

fn parse_hex_string(hex: &str) -> Result<Vec<u8>> {
    let clean = hex.replace(" ", "").replace("\n", "").replace("\r", "");
    hex::decode(&clean).context("Invalid hex string")
}

fn analyze_frame(bytes: &[u8], key: [u8; 16]) -> Result<()> {
    if bytes.len() != FRAME_LEN {
        println!(
            "Frame is {} bytes, expected exactly {} bytes.",
            bytes.len(),
            FRAME_LEN
        );
        print_hex_dump(bytes);
        return Ok(());
    }

    println!("Raw frame:");
    print_hex_dump(bytes);
    println!();

    println!("Frame tag:        0x{:02X}", bytes[0]);
    let crc_received = u16::from_le_bytes([bytes[17], bytes[18]]);
    let crc_computed = codec::crc16(&bytes[0..17]);
    println!(
        "CRC16-KERMIT:     received 0x{:04X}, computed 0x{:04X} ({})",
        crc_received,
        crc_computed,
        if crc_received == crc_computed {
            "match"
        } else {
            "MISMATCH"
        }
    );
    println!();

    let key_opt = if key == SYSTEM_KEY { None } else { Some(&key) };
    match codec::parse_frame(bytes, key_opt) {
        Ok(decoded) => {
            println!("Decrypted with key {}:", hex::encode(key));
            println!("  frame_tag:  0x{:02X}", decoded.frame_tag);
            println!("  command:    0x{:02X}", decoded.cmd);
            println!("  length:     {} ({})", decoded.length, if decoded.valid { "valid" } else { "INVALID" });
            println!(
                "  payload:    {} bytes ({})",
                decoded.payload.len(),
                hex::encode(&decoded.payload)
            );
        }
        Err(e) => {
            println!("Failed to decode frame under this key: {e}");
            println!("Pass --key <32 hex chars> to try a derived session key instead.");
        }
    }

    Ok(())
}

fn print_hex_dump(bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        print!("{:04X}  ", i * 16);
        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }
        if chunk.len() < 16 {
            for j in chunk.len()..16 {
                print!("   ");
                if j == 7 {
                    print!(" ");
                }
            }
        }
        print!(" ");
        for byte in chunk {
            let c = if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            };
            print!("{}", c);
        }
        println!();
    }
}

fn interactive_mode() -> Result<()> {
    println!("=== Interactive Frame Analyzer ===");
    println!("Paste hex data (Ctrl+D or Ctrl+Z to finish):\n");

    use std::io::{self, Read};
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let bytes = parse_hex_string(&buffer)?;
    analyze_frame(&bytes, SYSTEM_KEY)?;

    Ok(())
}
