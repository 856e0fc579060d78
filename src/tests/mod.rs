mod cancel_callback;
