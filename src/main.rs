use minelogic::*;
use std::thread;
use std::time::Duration;

fn main() {
    // --- 1. Initialization ---
    let mut rng = rand::rng();
    let mut game = Game::new(10, 10, 15, &mut rng);

    println!("--- Autonomous Minesweeper Bot ---");
    println!("Strategy: play proven-safe cells, probe at random otherwise.");
    println!("Initial Board:");
    print_board(&game);
    thread::sleep(Duration::from_secs(2));

    // --- 2. Game Loop ---
    let mut move_count = 0;
    while game.game_state() == GameState::Playing {
        move_count += 1;
        println!("\n--- Move #{} ---", move_count);

        // --- 3. Bot's Decision Logic ---

        // First, ask the knowledge base for a cell it has proven safe.
        let point_to_reveal = match game.solver().safe_move() {
            Some(point) => {
                println!("Deduction found a guaranteed safe cell.");
                Some(point)
            }
            None => {
                // No provable move, so explore an unknown cell at random.
                println!("No provably safe move. Probing at random...");
                game.solver().random_move(&mut rng)
            }
        };

        // --- 4. Execute the Chosen Move ---
        if let Some(point) = point_to_reveal {
            println!("Bot reveals ({}, {})...", point.x, point.y);

            game.reveal_cell(point).unwrap();

            print_board(&game);
        } else {
            // Every cell is either played or a proven mine; nothing is left
            // to probe.
            println!("No valid moves left for the bot to make.");
            break;
        }

        // Add a delay to make the game watchable
        thread::sleep(Duration::from_millis(500));
    }

    // --- 5. Final Result ---
    println!("\n--- Game Over ---");

    match game.game_state() {
        GameState::Won => println!(
            "Result: the bot won in {} moves, proving all {} mines!",
            move_count,
            game.total_mines()
        ),
        GameState::Lost => println!("Result: the bot hit a mine and lost."),
        GameState::Playing => println!("Result: the game ended unexpectedly."),
    }
}

fn print_board(game: &Game) {
    // Print header
    print!("   ");
    for x in 0..game.width() {
        print!("{:^3}", x);
    }
    println!("\n  +{}", "---".repeat(game.width()));

    // Print rows; cells the solver has proven to be mines are flagged.
    for y in 0..game.height() {
        print!("{:^2}|", y);
        for x in 0..game.width() {
            let point = Point { x, y };
            let display = match game.cell(point) {
                Cell::Hidden if game.solver().known_mines().contains(&point) => " F ".to_string(),
                Cell::Hidden => " ■ ".to_string(),
                Cell::Revealed(n) => format!(" {} ", n),
            };
            print!("{}", display);
        }
        println!();
    }
    println!();
}
