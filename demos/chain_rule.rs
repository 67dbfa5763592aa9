use revdiff::{DomainError, Pow, Var};

fn main() -> Result<(), DomainError> {
    let x = Var::new(2.0);
    let y = (&x + 2.0).pow(3_i32);
    let z = (-&y / 2.0)?;

    z.backward();

    println!("dz/dy = {}", y.grad()); // -0.5
    println!("dz/dx = {}", x.grad()); // -24
    Ok(())
}
