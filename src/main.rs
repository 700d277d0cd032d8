fn main() -> anyhow::Result<()> {
    pomodoro_lib::run()
}
