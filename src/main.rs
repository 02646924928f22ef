fn main() {
    gesture_overlay::run_cli();
}
