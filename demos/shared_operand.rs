use revdiff::{leaf, Tape};

fn main() {
    let x = leaf(5.0);
    let y = &x + 2.0;
    let z = (&y * &x) + &x;

    let tape = Tape::new(&z);
    tape.backward();
    println!("dz/dy = {}", y.grad()); // 5
    println!("dz/dx = {}", x.grad()); // 13

    // gradients accumulate until reset
    tape.backward();
    println!("dz/dx after two passes = {}", x.grad()); // 26

    tape.reset();
    println!("dz/dx after reset = {}", x.grad()); // 0
}
