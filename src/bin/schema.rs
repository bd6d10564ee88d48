//! Print the GraphQL schema in SDL form, for frontend codegen.

fn main() {
    println!("{}", konto::api::sdl());
}
