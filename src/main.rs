// Entry point for the ledger CLI. Each command opens the store, does one
// thing against the chain, the UTXO index or the wallet file, and exits.
use clap::Parser;
use log::{error, LevelFilter};
use std::process;
use utxo_ledger::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Blockchain,
    Command, Config, Opt, ProofOfWork, Transaction, UTXOSet, Wallets, Witness,
};

fn main() {
    // Info by default; RUST_LOG still wins when set.
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    let config = match load_config(&opt) {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(opt.command, &config) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(opt: &Opt) -> utxo_ledger::Result<Config> {
    let config = match &opt.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn run_command(command: Command, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let blockchain = Blockchain::create_blockchain(&address, config)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new(config)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let blockchain = Blockchain::new_blockchain(config)?;
            let utxo_set = UTXOSet::new(blockchain);
            let balance = utxo_set.get_balance(pub_key_hash.as_slice())?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new(config)?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send { from, to, amount } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }

            let blockchain = Blockchain::new_blockchain(config)?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let wallets = Wallets::new(config)?;
            let wallet = wallets.require_wallet(&from)?;
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            // The sender mines the block, so the reward goes to them too.
            let coinbase_tx = Transaction::new_coinbase_tx(&from, "", config)?;
            let block = blockchain.mine_block(&[coinbase_tx, transaction])?;
            utxo_set.update(&block)?;
            println!("Success!")
        }
        Command::Printchain => {
            let blockchain = Blockchain::new_blockchain(config)?;
            for block in blockchain.iterator() {
                let block = block?;
                println!("============ Block {} ============", block.get_hash());
                println!("Number: {}", block.get_number());
                println!("Prev. block: {}", block.get_parent_hash());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Miner: {}", block.get_header().get_miner());
                println!(
                    "PoW: {}",
                    ProofOfWork::validate(&block, config.difficulty_bits)
                );

                for tx in block.get_transactions() {
                    println!("- Transaction {}", tx.get_id());
                    for input in tx.get_vin() {
                        match input.get_witness() {
                            Witness::Coinbase { memo } => {
                                println!("-- Coinbase: {}", String::from_utf8_lossy(memo))
                            }
                            Witness::Spend { pub_key, .. } => {
                                let address = convert_address(hash_pub_key(pub_key).as_slice());
                                println!(
                                    "-- Input txid = {}, vout = {}, from = {}",
                                    data_encoding::HEXLOWER.encode(input.get_txid()),
                                    input.get_vout(),
                                    address,
                                )
                            }
                        }
                    }
                    for output in tx.get_vout() {
                        let address = convert_address(output.get_pub_key_hash());
                        println!("-- Output value = {}, to = {}", output.get_value(), address)
                    }
                }
                println!()
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::new_blockchain(config)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::Verifychain => {
            let blockchain = Blockchain::new_blockchain(config)?;
            let checked = blockchain.verify_chain()?;
            println!("Chain is valid: {checked} blocks checked.");
        }
    }
    Ok(())
}
